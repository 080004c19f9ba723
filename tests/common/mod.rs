//! Common test utilities for orchestrator integration tests
//!
//! This module provides deterministic mock workers and graph builders.

#![allow(dead_code)]

pub mod graph_builder;
pub mod mock_worker;

pub use graph_builder::{confident_nodes, dense_graph, random_graph, RandomGraphConfig};
pub use mock_worker::{ScriptedWorker, StallingWorker};
