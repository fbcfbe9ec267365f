//! End-to-end tests driving the demo router.
