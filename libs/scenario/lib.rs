//! Scenario core.  Converts application lifecycle configs into a time-ordered
//! sequence of events and, per event, decides how every sink is connected:
//! natively where multicast reachability exists, through AMT relay/gateway
//! tunnels where it does not.  The result is a history of independent
//! point-in-time snapshots.

pub mod application;
pub mod builder;
pub mod scheduler;
pub mod timeline;
