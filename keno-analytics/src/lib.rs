pub mod backtest;
pub mod cache;
pub mod combinations;
pub mod comparison;
pub mod config;
pub mod frequency;
pub mod momentum;
pub mod pattern_backtest;
pub mod patterns;
