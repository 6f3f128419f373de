//! Integration tests for the case portal
//! These drive the HTTP surface end to end against mock identity and Dynamics servers

mod test_harness;

mod api_test;
mod records_test;
mod session_flow_test;
