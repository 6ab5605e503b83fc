// Library root for the matchday binary: the request protocol and the
// per-league dispatch hub, exposed for tests.

pub mod hub;
pub mod protocol;
