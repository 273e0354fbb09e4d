//! Scenario tests for routes, dispatching and admission control


mod progress;
mod statistics;
