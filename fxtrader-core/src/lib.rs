//! fxtrader core: clock, broker adapters, historical data cache, portfolio lifecycle.
//!
//! This crate contains the tick-driven trading loop:
//! - Clocks that produce replay or wall-clock ticks behind one trait
//! - A broker contract with backtest and live implementations
//! - The historical candle loader with its on-disk Parquet cache
//! - The portfolio's pending → confirmed → closed order lifecycle
//! - Strategies and the controller that polls them once per tick

pub mod api;
pub mod broker;
pub mod clock;
pub mod config;
pub mod controller;
pub mod data;
pub mod domain;
pub mod portfolio;
pub mod shutdown;
pub mod strategy;
