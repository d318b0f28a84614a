//! Consumer/producer recording and cardinality checks.

use rt_core::FunctionId;
use rt_signals::Direction;

use crate::builder::{ConfigurationBuilder, Pass};
use crate::database::{DataSourceRecord, StateUsage, Usage};
use crate::error::{BuildError, BuildResult};

/// Timing signals every scheduled function reports.
const FUNCTION_TIMES: [&str; 3] = ["_ReadTime", "_ExecTime", "_WriteTime"];
const CURRENT_STATE: &str = "CurrentState";

/// Normalised `[low, high]` interval of a range row.
fn interval(range: [u32; 2]) -> (u32, u32) {
    (range[0].min(range[1]), range[0].max(range[1]))
}

/// First pair of overlapping intervals, if any.
pub(crate) fn find_overlap(intervals: &[(u32, u32)]) -> Option<((u32, u32), (u32, u32))> {
    let mut sorted = intervals.to_vec();
    sorted.sort_unstable();
    sorted
        .windows(2)
        .find(|w| w[1].0 <= w[0].1)
        .map(|w| (w[0], w[1]))
}

impl ConfigurationBuilder {
    /// Record, per state, who reads and who writes every data-source signal.
    pub fn resolve_consumers_and_producers(&mut self) -> BuildResult<()> {
        self.step(Pass::ResolveConsumersAndProducers, |b| {
            let db = &mut b.db;
            for (state, threads) in &db.states {
                let mut seen: Vec<FunctionId> = Vec::new();
                for id in threads.values().flatten() {
                    if seen.contains(id) {
                        continue;
                    }
                    seen.push(*id);
                    let record = &db.functions[id.as_usize()];
                    for direction in Direction::BOTH {
                        for signal in &record.side(direction).signals {
                            let ds_name = signal.data_source.as_deref().unwrap_or_default();
                            let entry = db
                                .data_sources
                                .get_mut(ds_name)
                                .and_then(|ds| ds.signals.get_mut(signal.remote_name()))
                                .ok_or_else(|| BuildError::InternalConsistency {
                                    what: format!(
                                        "'{}' is not bound to '{ds_name}'",
                                        signal.remote_name()
                                    ),
                                })?;
                            let usage = Usage {
                                function: *id,
                                function_name: record.qualified_name.clone(),
                                signal: signal.qualified_name.clone(),
                                ranges: signal.ranges.clone(),
                                samples: signal.samples_or_one(),
                            };
                            let per_state = entry.states.entry(state.clone()).or_default();
                            match direction {
                                Direction::Input => per_state.consumers.push(usage),
                                Direction::Output => per_state.producers.push(usage),
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Enforce the producer rules and add the per-function timing signals.
    pub fn verify_consumers_and_producers(&mut self) -> BuildResult<()> {
        self.step(Pass::VerifyConsumersAndProducers, |b| {
            if let Some(timing) = b.db.timing_data_source().map(str::to_string) {
                let scheduled: Vec<String> = b
                    .db
                    .functions
                    .iter()
                    .filter(|f| !f.states.is_empty())
                    .map(|f| f.qualified_name.clone())
                    .collect();
                for function in scheduled {
                    for suffix in FUNCTION_TIMES {
                        b.ensure_timing_signal(&timing, &format!("{function}{suffix}"))?;
                    }
                }
                b.ensure_timing_signal(&timing, CURRENT_STATE)?;
            }

            let check_multiple = b.options.check_multiple_producers_writes;
            for ds in b.db.data_sources.values() {
                verify_data_source(ds, check_multiple)?;
            }
            Ok(())
        })
    }
}

fn verify_data_source(ds: &DataSourceRecord, check_multiple: bool) -> BuildResult<()> {
    for (name, signal) in &ds.signals {
        for (state, usage) in &signal.states {
            if ds.is_timing() {
                if let Some(producer) = usage.producers.first() {
                    return Err(BuildError::TimingSignalProduced {
                        signal: format!("{}.{name}", ds.qualified_name),
                        function: producer.function_name.clone(),
                    });
                }
                continue;
            }

            for producer in &usage.producers {
                check_range_order(producer)?;
            }

            let producers = usage.distinct_producers().len();
            match producers {
                0 if usage.consumers.is_empty() || ds.signal_allows_no_producers(signal) => {}
                1 => {}
                n if n >= 2 && !check_multiple => {
                    tracing::debug!(data_source = %ds.qualified_name, signal = %name, state, producers = n, "multiple producers allowed");
                }
                n if n >= 2 && usage.producers.iter().all(|p| p.ranges.is_some()) => {
                    check_overlap(&ds.qualified_name, name, state, usage)?;
                }
                n => {
                    return Err(BuildError::ZeroOrMultipleProducers {
                        signal: name.clone(),
                        data_source: ds.qualified_name.clone(),
                        state: state.clone(),
                        producers: n,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Rows of one producer must be ascending and disjoint.
fn check_range_order(producer: &Usage) -> BuildResult<()> {
    let Some(ranges) = &producer.ranges else {
        return Ok(());
    };
    for pair in ranges.windows(2) {
        let (_, prev_high) = interval(pair[0]);
        let (low, high) = interval(pair[1]);
        if low <= prev_high {
            return Err(BuildError::RangeOrder {
                signal: producer.signal.clone(),
                function: producer.function_name.clone(),
                min: low,
                max: high,
            });
        }
    }
    Ok(())
}

fn check_overlap(data_source: &str, signal: &str, state: &str, usage: &StateUsage) -> BuildResult<()> {
    let intervals: Vec<(u32, u32)> = usage
        .producers
        .iter()
        .filter_map(|p| p.ranges.as_ref())
        .flatten()
        .map(|r| interval(*r))
        .collect();
    if let Some((a, b)) = find_overlap(&intervals) {
        tracing::error!(data_source, signal, state, first = ?a, second = ?b, "overlapping producer ranges");
        return Err(BuildError::RangeOverlap {
            signal: signal.to_string(),
            data_source: data_source.to_string(),
            state: state.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn producer(function: u32, ranges: Vec<[u32; 2]>) -> Usage {
        Usage {
            function: FunctionId::from_index(function),
            function_name: format!("GAM{function}"),
            signal: "S".into(),
            ranges: Some(ranges),
            samples: 1,
        }
    }

    #[test]
    fn disjoint_partial_producers() {
        let usage = StateUsage {
            consumers: vec![],
            producers: vec![producer(0, vec![[0, 10], [15, 20]]), producer(1, vec![[11, 14], [21, 31]])],
        };
        assert!(check_overlap("DDB1", "S", "State1", &usage).is_ok());
    }

    #[test]
    fn overlapping_partial_producers() {
        let usage = StateUsage {
            consumers: vec![],
            producers: vec![producer(0, vec![[0, 10]]), producer(1, vec![[10, 14]])],
        };
        let err = check_overlap("DDB1", "S", "State1", &usage).unwrap_err();
        assert!(matches!(err, BuildError::RangeOverlap { .. }));
    }

    #[test]
    fn descending_rows_rejected() {
        assert!(check_range_order(&producer(0, vec![[15, 20], [0, 10]])).is_err());
        assert!(check_range_order(&producer(0, vec![[0, 10], [15, 20]])).is_ok());
        // reversed bounds inside one row are left to the memory size pass
        assert!(check_range_order(&producer(0, vec![[14, 11], [21, 31]])).is_ok());
    }

    proptest! {
        #[test]
        fn overlap_detection_matches_brute_force(
            rows in proptest::collection::vec((0_u32..64, 0_u32..8), 1..8)
        ) {
            let intervals: Vec<(u32, u32)> = rows.iter().map(|(lo, len)| (*lo, lo + len)).collect();
            let mut brute = false;
            for i in 0..intervals.len() {
                for j in (i + 1)..intervals.len() {
                    let (a, b) = (intervals[i], intervals[j]);
                    if a.0 <= b.1 && b.0 <= a.1 {
                        brute = true;
                    }
                }
            }
            prop_assert_eq!(find_overlap(&intervals).is_some(), brute);
        }
    }
}
