//! Converts the application config list into a time-ordered event sequence
//! and drives a transition function over it, threading a deep-copied
//! snapshot through time.  The recorded history is a complete, independently
//! inspectable state per timestamp.

use crate::application::{AppFactory, Application};
use crate::timeline::{Timeline, TimelineAction, TimelineState};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use topology::{AppConfig, AppKind};

/// A timestamp usable as an ordered map key.  Total order over f64 so equal
/// times group into one action and NaN cannot corrupt the ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct Time(pub f64);

impl PartialEq for Time {
    fn eq(&self, other: &Time) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Time) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Time) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type History = BTreeMap<Time, Timeline>;

pub struct ScenarioScheduler {
    applications: Vec<AppConfig>,
    factory: AppFactory,
}

impl ScenarioScheduler {
    pub fn new(applications: Vec<AppConfig>) -> ScenarioScheduler {
        ScenarioScheduler {
            applications,
            factory: AppFactory::new(),
        }
    }

    /// Runs the transition over every timestamp in increasing order.  Each
    /// call receives a private copy of the previous snapshot; the returned
    /// state is recorded in the history and cloned again for the next step,
    /// so no two history entries alias.
    pub fn process<F>(mut self, mut transition: F) -> History
    where
        F: FnMut(&mut AppFactory, TimelineState, &TimelineAction) -> TimelineState,
    {
        let events = self.schedule();
        let mut history = History::new();
        let mut state = TimelineState::default();

        for (time, action) in events {
            log::info!("processing timestamp {}", time);
            let next = transition(&mut self.factory, state.clone(), &action);
            state = next.clone();
            history.insert(
                time,
                Timeline {
                    time,
                    action,
                    snapshot: next,
                },
            );
        }
        history
    }

    /// Groups every schedule/shutdown event by its exact timestamp.
    fn schedule(&mut self) -> BTreeMap<Time, TimelineAction> {
        let mut events: BTreeMap<Time, TimelineAction> = BTreeMap::new();

        for config in &self.applications {
            match config.kind {
                AppKind::Source => {
                    let host = self.factory.create_host(&config.node, &config.address);
                    events
                        .entry(Time(config.start))
                        .or_default()
                        .schedule(Application::Host(host.clone()));
                    events
                        .entry(Time(config.stop))
                        .or_default()
                        .shutdown(Application::Host(host));
                }
                AppKind::Sink => {
                    let sink = self.factory.create_sink(&config.node, &config.address);
                    events
                        .entry(Time(config.start))
                        .or_default()
                        .schedule(Application::Sink(sink.clone()));
                    events
                        .entry(Time(config.stop))
                        .or_default()
                        .shutdown(Application::Sink(sink));
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: AppKind, node: &str, start: f64, stop: f64) -> AppConfig {
        AppConfig {
            kind,
            node: node.to_string(),
            address: "239.0.0.1".to_string(),
            start,
            stop,
        }
    }

    /// A transition that registers and releases hosts/sinks without any
    /// routing, enough to observe the scheduler's contract.
    fn register_only(
        _factory: &mut AppFactory,
        mut snapshot: TimelineState,
        action: &TimelineAction,
    ) -> TimelineState {
        for host in action.schedule_hosts.values() {
            snapshot.schedule(Application::Host(host.clone()));
        }
        for sink in action.schedule_sinks.values() {
            snapshot.schedule(Application::Sink(sink.clone()));
        }
        for host in action.shutdown_hosts.values() {
            snapshot.shutdown(&Application::Host(host.clone()));
        }
        for sink in action.shutdown_sinks.values() {
            snapshot.shutdown(&Application::Sink(sink.clone()));
        }
        snapshot
    }

    #[test]
    fn test_history_keys_strictly_increase() {
        let scheduler = ScenarioScheduler::new(vec![
            config(AppKind::Source, "host0", 1.0, 9.0),
            config(AppKind::Sink, "sink0", 3.0, 7.0),
        ]);
        let history = scheduler.process(register_only);
        let times: Vec<f64> = history.keys().map(|t| t.0).collect();
        assert_eq!(times, vec![1.0, 3.0, 7.0, 9.0]);
    }

    #[test]
    fn test_same_time_events_group_into_one_action() {
        let scheduler = ScenarioScheduler::new(vec![
            config(AppKind::Source, "host0", 1.0, 9.0),
            config(AppKind::Sink, "sink0", 1.0, 9.0),
            config(AppKind::Sink, "sink1", 1.0, 9.0),
        ]);
        let history = scheduler.process(register_only);
        assert_eq!(history.len(), 2);
        let first = &history[&Time(1.0)];
        assert_eq!(first.action.schedule_hosts.len(), 1);
        assert_eq!(first.action.schedule_sinks.len(), 2);
        assert_eq!(first.snapshot.hosts.len(), 1);
        assert_eq!(first.snapshot.sinks.len(), 2);
    }

    #[test]
    fn test_snapshots_accumulate_and_release() {
        let scheduler = ScenarioScheduler::new(vec![
            config(AppKind::Source, "host0", 1.0, 9.0),
            config(AppKind::Sink, "sink0", 3.0, 7.0),
        ]);
        let history = scheduler.process(register_only);
        assert_eq!(history[&Time(1.0)].snapshot.sinks.len(), 0);
        assert_eq!(history[&Time(3.0)].snapshot.sinks.len(), 1);
        assert_eq!(history[&Time(7.0)].snapshot.sinks.len(), 0);
        assert_eq!(history[&Time(9.0)].snapshot.hosts.len(), 0);
    }

    #[test]
    fn test_snapshots_are_value_independent() {
        let scheduler = ScenarioScheduler::new(vec![
            config(AppKind::Source, "host0", 1.0, 9.0),
            config(AppKind::Sink, "sink0", 3.0, 7.0),
        ]);
        let mut history = scheduler.process(register_only);
        let before = history[&Time(1.0)].snapshot.clone();
        // mutating a later snapshot must not reach back in time
        let late = history.get_mut(&Time(3.0)).unwrap();
        let host_id = late.snapshot.hosts.values().next().unwrap().id.clone();
        let sink_id = late.snapshot.sinks.values().next().unwrap().id.clone();
        late.snapshot.join(&host_id, &sink_id);
        assert!(history[&Time(1.0)]
            .snapshot
            .hosts
            .get(&host_id)
            .sinks
            .is_empty());
        assert_eq!(history[&Time(1.0)].snapshot.hosts.len(), before.hosts.len());
    }

    #[test]
    fn test_start_equal_to_stop_leaves_no_residue() {
        let scheduler = ScenarioScheduler::new(vec![
            config(AppKind::Source, "host0", 1.0, 9.0),
            config(AppKind::Sink, "sink0", 5.0, 5.0),
        ]);
        let history = scheduler.process(register_only);
        assert_eq!(history[&Time(5.0)].snapshot.sinks.len(), 0);
    }
}
