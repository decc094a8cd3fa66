pub mod args;
mod class_stats;
mod evaluate;
mod plan;
mod preview;
mod utils;
