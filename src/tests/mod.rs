// Sawmill's Test Infrastructure
//
// Cross-module tests for the indexing orchestration layer: rotation
// grouping, debounce timing, worker decisions, scheduler mutual exclusion,
// recovery idempotence, and cache generation handling. Shared fixtures
// (stub engine, recording shard registry, context builder) live in helpers.

pub mod helpers;

pub mod rotation_tests;
pub mod scheduler_tests;
pub mod worker_tests;
