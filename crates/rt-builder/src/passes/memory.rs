//! Function and data-source memory layout.

use indexmap::IndexMap;
use rt_signals::Direction;

use super::{align_up, qualified, too_large};
use crate::builder::{ConfigurationBuilder, Pass};
use crate::database::{
    DataSourceFunction, DataSourceFunctionSignal, MemoryBlock, SignalFootprint, SignalSlot,
};
use crate::datasource::{DataSourceLayout, LayoutSignal, encode_default};
use crate::error::{BuildError, BuildResult};

impl ConfigurationBuilder {
    /// Byte footprint of every function signal, with range validation.
    pub fn resolve_function_signals_memory_size(&mut self) -> BuildResult<()> {
        self.step(Pass::ResolveFunctionSignalsMemorySize, |b| {
            for record in &mut b.db.functions {
                let owner = record.qualified_name.clone();
                for direction in Direction::BOTH {
                    let side = record.side_mut(direction);
                    let mut footprints = Vec::with_capacity(side.signals.len());
                    for signal in &side.signals {
                        let element = signal.basic_type().map_or(0, |t| t.byte_size());
                        let elements = signal.element_count();
                        let bytes = element
                            .checked_mul(elements)
                            .ok_or_else(|| too_large(qualified(&owner, signal)))?;
                        if bytes == 0 {
                            return Err(BuildError::FatalSize {
                                signal: qualified(&owner, signal),
                                reason: "signal has zero bytes".into(),
                            });
                        }
                        let footprint = match &signal.ranges {
                            None => SignalFootprint {
                                byte_offsets: vec![[0, bytes]],
                                byte_size: bytes
                                    .checked_mul(signal.samples_or_one())
                                    .ok_or_else(|| too_large(qualified(&owner, signal)))?,
                            },
                            Some(ranges) => {
                                let mut rows = Vec::with_capacity(ranges.len());
                                for &[min, max] in ranges {
                                    if min > max {
                                        return Err(BuildError::RangeOrder {
                                            signal: signal.qualified_name.clone(),
                                            function: owner.clone(),
                                            min,
                                            max,
                                        });
                                    }
                                    if max >= elements {
                                        return Err(BuildError::DimensionMismatch {
                                            signal: qualified(&owner, signal),
                                            index: max,
                                            elements,
                                        });
                                    }
                                    rows.push([min * element, (max - min + 1) * element]);
                                }
                                let byte_size = rows
                                    .iter()
                                    .try_fold(0_u32, |acc, r| acc.checked_add(r[1]))
                                    .ok_or_else(|| too_large(qualified(&owner, signal)))?;
                                SignalFootprint {
                                    byte_offsets: rows,
                                    byte_size,
                                }
                            }
                        };
                        tracing::debug!(
                            function = %owner,
                            signal = %signal.qualified_name,
                            bytes = footprint.byte_size,
                            "signal footprint"
                        );
                        footprints.push(footprint);
                    }
                    side.footprints = footprints;
                }
            }
            Ok(())
        })
    }

    /// Group each function's signals into per-data-source blocks.
    pub fn resolve_functions_memory(&mut self) -> BuildResult<()> {
        self.step(Pass::ResolveFunctionsMemory, |b| {
            let data_sources = &b.db.data_sources;
            for record in &mut b.db.functions {
                for direction in Direction::BOTH {
                    let side = record.side_mut(direction);
                    let mut blocks: IndexMap<String, MemoryBlock> = IndexMap::new();
                    for (index, (signal, footprint)) in side.signals.iter().zip(&side.footprints).enumerate() {
                        let ds_name = signal.data_source.clone().unwrap_or_default();
                        let data_source_signal = data_sources
                            .get(&ds_name)
                            .and_then(|ds| ds.signals.get_index_of(signal.remote_name()))
                            .ok_or_else(|| BuildError::InternalConsistency {
                                what: format!("'{}' is not bound to '{ds_name}'", signal.remote_name()),
                            })?;
                        let bytes = signal.byte_size.unwrap_or(0);
                        let padding = match (&signal.ranges, signal.member_size) {
                            (None, Some(member)) if signal.samples_or_one() == 1 => {
                                member.saturating_sub(bytes)
                            }
                            _ => 0,
                        };
                        let slot = SignalSlot {
                            signal_index: index,
                            qualified_name: signal.qualified_name.clone(),
                            remote_name: signal.remote_name().to_string(),
                            data_source_signal,
                            byte_offsets: footprint.byte_offsets.clone(),
                            byte_size: footprint.byte_size,
                            padding,
                            samples: signal.samples_or_one(),
                            frequency: signal.frequency,
                            trigger: signal.trigger,
                            alignment: signal.alignment.unwrap_or(1),
                            gam_memory_offset: 0,
                            broker: None,
                        };
                        blocks
                            .entry(ds_name.clone())
                            .or_insert_with(|| MemoryBlock {
                                data_source: ds_name,
                                signals: Vec::new(),
                                byte_size: 0,
                            })
                            .signals
                            .push(slot);
                    }
                    side.blocks = blocks.into_values().collect();
                }
            }
            Ok(())
        })
    }

    /// Assign GAM memory offsets: inputs first, then outputs.
    pub fn calculate_functions_memory(&mut self) -> BuildResult<()> {
        self.step(Pass::CalculateFunctionsMemory, |b| {
            for record in &mut b.db.functions {
                let owner = record.qualified_name.clone();
                let mut offset = 0_u32;
                for direction in Direction::BOTH {
                    for block in &mut record.side_mut(direction).blocks {
                        let mut size = 0_u32;
                        for slot in &mut block.signals {
                            let overflow = || too_large(format!("{owner}.{}", slot.qualified_name));
                            offset = align_up(offset, slot.alignment).ok_or_else(overflow)?;
                            slot.gam_memory_offset = offset;
                            offset = offset
                                .checked_add(slot.byte_size)
                                .and_then(|o| o.checked_add(slot.padding))
                                .ok_or_else(overflow)?;
                            size = size.checked_add(slot.byte_size).ok_or_else(overflow)?;
                        }
                        block.byte_size = size;
                    }
                }
                record.byte_size = offset;
                tracing::debug!(function = %record.qualified_name, bytes = offset, "function memory");
            }
            Ok(())
        })
    }

    /// Pack every data source and let it allocate its buffers.
    pub fn assign_functions_memory_to_data_source(&mut self) -> BuildResult<()> {
        self.step(Pass::AssignFunctionsMemoryToDataSource, |b| {
            let functions = &b.db.functions;
            for ds in b.db.data_sources.values_mut() {
                // largest number of samples any user moves, per signal
                let mut samples = vec![1_u32; ds.signals.len()];
                let mut users = Vec::new();
                for record in functions {
                    let mut entry = DataSourceFunction {
                        function: record.id,
                        qualified_name: record.qualified_name.clone(),
                        signals: Vec::new(),
                        byte_size: 0,
                    };
                    for direction in Direction::BOTH {
                        let blocks = record.side(direction).blocks.iter();
                        for block in blocks.filter(|blk| blk.data_source == ds.qualified_name) {
                            for slot in &block.signals {
                                samples[slot.data_source_signal] =
                                    samples[slot.data_source_signal].max(slot.samples);
                                entry.signals.push(DataSourceFunctionSignal {
                                    qualified_name: slot.qualified_name.clone(),
                                    remote_name: slot.remote_name.clone(),
                                    direction,
                                    byte_size: slot.byte_size,
                                    broker: None,
                                });
                            }
                            entry.byte_size = entry.byte_size.saturating_add(block.byte_size);
                        }
                    }
                    if !entry.signals.is_empty() {
                        users.push(entry);
                    }
                }

                let mut offset = 0_u32;
                let mut signals = Vec::with_capacity(ds.signals.len());
                for ((name, signal), samples) in ds.signals.iter().zip(&samples) {
                    let d = &signal.descriptor;
                    let basic = d.basic_type().ok_or_else(|| BuildError::UnresolvedType {
                        signal: format!("{}.{name}", ds.qualified_name),
                        type_name: d.type_name.clone().unwrap_or_default(),
                    })?;
                    let bytes = d.byte_size.unwrap_or(0);
                    let stride = d.member_size.unwrap_or(bytes).max(bytes);
                    if stride == 0 {
                        return Err(BuildError::FatalSize {
                            signal: format!("{}.{name}", ds.qualified_name),
                            reason: "signal has zero bytes".into(),
                        });
                    }
                    let overflow = || too_large(format!("{}.{name}", ds.qualified_name));
                    let span = stride.checked_mul(*samples).ok_or_else(overflow)?;
                    offset = align_up(offset, d.alignment.unwrap_or(1)).ok_or_else(overflow)?;
                    let default = match &d.default {
                        Some(value) => {
                            let mut encoded = encode_default(name, basic, d.element_count(), value)?;
                            encoded.resize(stride as usize, 0);
                            Some(encoded)
                        }
                        None => None,
                    };
                    signals.push(LayoutSignal {
                        name: name.clone(),
                        basic_type: basic,
                        number_of_elements: d.element_count(),
                        offset,
                        size: span,
                        default,
                        states: signal
                            .states
                            .iter()
                            .filter(|(_, u)| !u.consumers.is_empty() || !u.producers.is_empty())
                            .map(|(s, _)| s.clone())
                            .collect(),
                    });
                    offset = offset.checked_add(span).ok_or_else(overflow)?;
                }
                if offset.checked_mul(ds.object.number_of_buffers()).is_none() {
                    return Err(too_large(ds.qualified_name.clone()));
                }

                let layout = DataSourceLayout {
                    name: ds.qualified_name.clone(),
                    signals,
                    buffer_size: offset,
                    number_of_buffers: ds.object.number_of_buffers(),
                };
                check_disjoint(&layout)?;
                ds.object.allocate_memory(&layout)?;
                tracing::debug!(
                    data_source = %ds.qualified_name,
                    buffer_size = layout.buffer_size,
                    buffers = layout.number_of_buffers,
                    "data source memory"
                );
                ds.layout = Some(layout);
                ds.functions = users;
            }
            Ok(())
        })
    }
}

/// Signals of one buffer copy must not share bytes.
fn check_disjoint(layout: &DataSourceLayout) -> BuildResult<()> {
    let mut spans: Vec<(u32, u32, &str)> = layout
        .signals
        .iter()
        .filter(|s| s.size > 0)
        .map(|s| (s.offset, s.offset + s.size, s.name.as_str()))
        .collect();
    spans.sort_unstable();
    for w in spans.windows(2) {
        if w[1].0 < w[0].1 {
            return Err(BuildError::InternalConsistency {
                what: format!(
                    "'{}.{}' overlaps '{}.{}'",
                    layout.name, w[0].2, layout.name, w[1].2
                ),
            });
        }
    }
    if spans.last().is_some_and(|s| s.1 > layout.buffer_size) {
        return Err(BuildError::InternalConsistency {
            what: format!("'{}' signals exceed the buffer", layout.name),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_core::BasicType;

    fn signal(name: &str, offset: u32, size: u32) -> LayoutSignal {
        LayoutSignal {
            name: name.into(),
            basic_type: BasicType::UInt8,
            number_of_elements: size,
            offset,
            size,
            default: None,
            states: vec![],
        }
    }

    #[test]
    fn overlap_is_internal_error() {
        let layout = DataSourceLayout {
            name: "DDB1".into(),
            signals: vec![signal("A", 0, 4), signal("B", 2, 4)],
            buffer_size: 6,
            number_of_buffers: 1,
        };
        let err = check_disjoint(&layout).unwrap_err();
        assert!(matches!(err, BuildError::InternalConsistency { .. }));

        let layout = DataSourceLayout {
            signals: vec![signal("A", 0, 4), signal("B", 4, 4)],
            buffer_size: 8,
            ..layout
        };
        assert!(check_disjoint(&layout).is_ok());
    }
}
