// Sentinel's Test Infrastructure
//
// Scenario tests that exercise several modules together. Small helpers keep
// their unit tests next to the implementation.




pub mod metrics_tests;

// ============================================================================
// SERVICE TESTS - Lifecycle and end-to-end flows
// ============================================================================
pub mod service_tests;
