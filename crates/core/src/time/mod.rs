pub mod market_clock;
