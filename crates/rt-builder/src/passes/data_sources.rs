//! Binding function signals to data sources and completing both sides.

use rt_core::BasicType;
use rt_signals::{Direction, SignalDescriptor, attr, merge};

use super::{qualified, too_large};
use crate::builder::{ConfigurationBuilder, Pass};
use crate::database::DataSourceSignal;
use crate::datasource::encode_default;
use crate::error::{BuildError, BuildResult};

const UNDEFINED: &str = "(undefined)";

/// The data-source facing part of a function signal.
fn data_source_view(signal: &SignalDescriptor, data_source: &str) -> SignalDescriptor {
    SignalDescriptor {
        qualified_name: signal.remote_name().to_string(),
        type_name: signal.type_name.clone(),
        full_type: signal.full_type.clone(),
        number_of_dimensions: signal.number_of_dimensions,
        number_of_elements: signal.number_of_elements,
        data_source: Some(data_source.to_string()),
        default: signal.default.clone(),
        member_size: signal.member_size,
        alignment: signal.alignment,
        allow_no_producers: signal.allow_no_producers,
        ..SignalDescriptor::default()
    }
}

/// `name` is a strict structural prefix of `other`.
fn is_parent_of(name: &str, other: &str) -> bool {
    other.len() > name.len()
        && other.starts_with(name)
        && matches!(other.as_bytes()[name.len()], b'.' | b'[')
}

impl ConfigurationBuilder {
    /// Add every function signal to its data source, merging attributes.
    pub fn resolve_data_sources(&mut self) -> BuildResult<()> {
        self.step(Pass::ResolveDataSources, |b| {
            for record in &b.db.functions {
                for direction in Direction::BOTH {
                    for signal in &record.side(direction).signals {
                        let ds_name = signal.data_source.as_deref().unwrap_or_default();
                        let ds = b.db.data_sources.get_mut(ds_name).ok_or_else(|| {
                            BuildError::UnknownDataSource {
                                function: record.qualified_name.clone(),
                                signal: signal.qualified_name.clone(),
                                data_source: ds_name.to_string(),
                            }
                        })?;
                        let view = data_source_view(signal, ds_name);
                        match ds.signals.get_mut(signal.remote_name()) {
                            Some(existing) => merge(&mut existing.descriptor, &view)?,
                            None if ds.locked => {
                                return Err(BuildError::LockedDataSource {
                                    data_source: ds_name.to_string(),
                                    signal: signal.remote_name().to_string(),
                                });
                            }
                            None => {
                                tracing::debug!(
                                    data_source = ds_name,
                                    signal = %view.qualified_name,
                                    function = %record.qualified_name,
                                    "added signal to data source"
                                );
                                ds.signals
                                    .insert(view.qualified_name.clone(), DataSourceSignal::new(view));
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Complete every data-source signal: type, elements, size, defaults.
    pub fn verify_data_sources_signals(&mut self) -> BuildResult<()> {
        self.step(Pass::VerifyDataSourcesSignals, |b| {
            for ds in b.db.data_sources.values_mut() {
                let names: Vec<String> = ds.signals.keys().cloned().collect();
                let partial: Vec<&String> = names
                    .iter()
                    .filter(|n| ds.signals[n.as_str()].descriptor.type_name.is_none())
                    .filter(|n| names.iter().any(|other| is_parent_of(n, other)))
                    .collect();
                for name in partial {
                    tracing::debug!(data_source = %ds.qualified_name, signal = %name, "pruned partial definition");
                    ds.signals.shift_remove(name.as_str());
                }

                for signal in ds.signals.values_mut() {
                    complete_data_source_signal(&ds.qualified_name, &mut signal.descriptor)?;
                }
            }
            Ok(())
        })
    }

    /// Back-fill function signals from their data-source signal.
    pub fn resolve_function_signals(&mut self) -> BuildResult<()> {
        self.step(Pass::ResolveFunctionSignals, |b| {
            let data_sources = &b.db.data_sources;
            for record in &mut b.db.functions {
                let owner = record.qualified_name.clone();
                for direction in Direction::BOTH {
                    for signal in &mut record.side_mut(direction).signals {
                        let ds_name = signal.data_source.as_deref().unwrap_or_default();
                        let source = data_sources
                            .get(ds_name)
                            .and_then(|ds| ds.signals.get(signal.remote_name()))
                            .ok_or_else(|| BuildError::InternalConsistency {
                                what: format!(
                                    "'{}' is not registered in '{ds_name}'",
                                    qualified(&owner, signal)
                                ),
                            })?;
                        let from = &source.descriptor;
                        if signal.type_name.is_none() {
                            signal.type_name = from.type_name.clone();
                        }
                        if signal.full_type.is_none() {
                            signal.full_type = from.full_type.clone();
                        }
                        if signal.number_of_elements.is_none() {
                            signal.number_of_elements = from.number_of_elements;
                        }
                        if signal.number_of_dimensions.is_none() {
                            signal.number_of_dimensions = from.number_of_dimensions;
                        }
                        if signal.default.is_none() {
                            signal.default = from.default.clone();
                        }
                        if signal.member_size.is_none() {
                            signal.member_size = from.member_size;
                        }
                        if signal.alignment.is_none() {
                            signal.alignment = from.alignment;
                        }
                        signal.byte_size = from.byte_size;
                    }
                }
            }
            Ok(())
        })
    }

    /// Every function signal must now be fully specified.
    pub fn verify_function_signals(&mut self) -> BuildResult<()> {
        self.step(Pass::VerifyFunctionSignals, |b| {
            for record in &b.db.functions {
                for direction in Direction::BOTH {
                    for signal in &record.side(direction).signals {
                        let name = qualified(&record.qualified_name, signal);
                        if signal.basic_type().is_none() {
                            return Err(BuildError::UnresolvedType {
                                signal: name,
                                type_name: signal.type_name.clone().unwrap_or_else(|| UNDEFINED.into()),
                            });
                        }
                        if signal.element_count() == 0 {
                            return Err(BuildError::FatalSize {
                                signal: name,
                                reason: "zero elements".into(),
                            });
                        }
                        if signal.samples == Some(0) {
                            return Err(BuildError::MalformedAttribute {
                                signal: name,
                                reason: format!("{} must be at least 1", attr::SAMPLES),
                            });
                        }
                        if signal.ranges.is_some() && signal.samples_or_one() > 1 {
                            return Err(BuildError::MalformedAttribute {
                                signal: name,
                                reason: format!(
                                    "{} cannot be combined with {} > 1",
                                    attr::RANGES,
                                    attr::SAMPLES
                                ),
                            });
                        }
                        if signal.ranges.as_ref().is_some_and(Vec::is_empty) {
                            return Err(BuildError::MalformedAttribute {
                                signal: name,
                                reason: format!("{} is empty", attr::RANGES),
                            });
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

fn complete_data_source_signal(data_source: &str, d: &mut SignalDescriptor) -> BuildResult<()> {
    let name = qualified(data_source, d);
    let basic = match d.type_name.as_deref() {
        None => {
            return Err(BuildError::UnresolvedType {
                signal: name,
                type_name: UNDEFINED.into(),
            });
        }
        Some(t) => BasicType::parse(t).ok_or_else(|| BuildError::UnresolvedType {
            signal: name.clone(),
            type_name: t.to_string(),
        })?,
    };
    d.type_name = Some(basic.name().to_string());

    let elements = *d.number_of_elements.get_or_insert(1);
    if elements == 0 {
        return Err(BuildError::FatalSize {
            signal: name,
            reason: "zero elements".into(),
        });
    }
    if d.number_of_dimensions.is_none() {
        if elements > 1 {
            tracing::warn!(signal = %name, elements, "array declared without dimensions; assuming a vector");
            d.number_of_dimensions = Some(1);
        } else {
            d.number_of_dimensions = Some(0);
        }
    }
    if d.number_of_dimensions == Some(0) && elements > 1 {
        return Err(BuildError::MalformedAttribute {
            signal: name,
            reason: format!("scalar with {elements} elements"),
        });
    }

    let byte_size = basic
        .byte_size()
        .checked_mul(elements)
        .ok_or_else(|| too_large(name.clone()))?;
    if let Some(declared) = d.byte_size {
        if declared != byte_size {
            return Err(BuildError::SignalConflict {
                signal: name,
                attribute: attr::BYTE_SIZE.into(),
                existing: declared.to_string(),
                incoming: byte_size.to_string(),
            });
        }
    }
    d.byte_size = Some(byte_size);
    if d.alignment.is_none() {
        d.alignment = Some(basic.alignment());
    }
    if d.full_type.is_none() {
        d.full_type = Some(basic.name().to_string());
    }
    if let Some(default) = &d.default {
        encode_default(&name, basic, elements, default)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_tree::Value;

    #[test]
    fn parent_prefix() {
        assert!(is_parent_of("Signal1", "Signal1.a1"));
        assert!(is_parent_of("Signal1", "Signal1[0].a1"));
        assert!(!is_parent_of("Signal1", "Signal10"));
        assert!(!is_parent_of("Signal1", "Signal1"));
    }

    #[test]
    fn completes_scalar() {
        let mut d = SignalDescriptor::new("S").with_type("float64");
        complete_data_source_signal("DDB1", &mut d).unwrap();
        assert_eq!(d.number_of_elements, Some(1));
        assert_eq!(d.number_of_dimensions, Some(0));
        assert_eq!(d.byte_size, Some(8));
        assert_eq!(d.alignment, Some(8));
    }

    #[test]
    fn promotes_undeclared_vector() {
        let mut d = SignalDescriptor::new("S").with_type("uint16").with_elements(4);
        complete_data_source_signal("DDB1", &mut d).unwrap();
        assert_eq!(d.number_of_dimensions, Some(1));
        assert_eq!(d.byte_size, Some(8));
    }

    #[test]
    fn rejects_zero_elements_and_bad_defaults() {
        let mut d = SignalDescriptor::new("S").with_type("uint16").with_elements(0);
        let err = complete_data_source_signal("DDB1", &mut d).unwrap_err();
        assert!(matches!(err, BuildError::FatalSize { .. }));

        let mut d = SignalDescriptor::new("S").with_type("uint8").with_elements(3);
        d.default = Some(Value::from(vec![1_u8, 2]));
        let err = complete_data_source_signal("DDB1", &mut d).unwrap_err();
        assert!(matches!(err, BuildError::DefaultMismatch { .. }));

        let mut d = SignalDescriptor::new("S");
        let err = complete_data_source_signal("DDB1", &mut d).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedType { .. }));
    }

    #[test]
    fn view_drops_per_use_attributes() {
        let mut signal = SignalDescriptor::new("Local")
            .with_type("uint32")
            .with_alias("Remote")
            .with_ranges(vec![[0, 1]]);
        signal.samples = Some(2);
        let view = data_source_view(&signal, "DDB1");
        assert_eq!(view.qualified_name, "Remote");
        assert_eq!(view.ranges, None);
        assert_eq!(view.samples, None);
        assert_eq!(view.data_source.as_deref(), Some("DDB1"));
    }
}
