//! Data-source capability interface.
//!
//! The builder only talks to data sources through `DataSource`: it asks for
//! broker recommendations, buffering depth and producer policy, and hands
//! over the resolved layout so the variant can allocate its memory.

use std::fmt;

use indexmap::IndexMap;
use rt_core::{BasicType, RtError, RtResult};
use rt_signals::Direction;
use rt_tree::{ConfigTree, Value};
use serde::Serialize;

use crate::error::{BuildError, BuildResult};
use crate::gam_data_source::GamDataSource;
use crate::memory_data_source::MemoryDataSource;
use crate::timing_data_source::TimingDataSource;

/// Signal attributes a data source sees when recommending a broker.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerQuery<'a> {
    pub function: &'a str,
    pub signal: &'a str,
    pub frequency: Option<f32>,
    pub trigger: bool,
    pub samples: u32,
    pub number_of_elements: u32,
    pub byte_size: u32,
}

impl BrokerQuery<'_> {
    pub fn is_synchronising(&self) -> bool {
        self.frequency.is_some_and(|f| f >= 0.0)
    }
}

/// One signal placed in a data source buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutSignal {
    pub name: String,
    pub basic_type: BasicType,
    pub number_of_elements: u32,
    /// Offset within a single buffer copy.
    pub offset: u32,
    /// Bytes reserved within a single buffer copy.
    pub size: u32,
    /// Encoded default for one sample, if declared.
    pub default: Option<Vec<u8>>,
    /// States in which any function reads or writes the signal.
    pub states: Vec<String>,
}

impl LayoutSignal {
    pub fn used_in(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }
}

/// Resolved memory layout of one data source.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DataSourceLayout {
    pub name: String,
    pub signals: Vec<LayoutSignal>,
    /// Size of one buffer copy.
    pub buffer_size: u32,
    pub number_of_buffers: u32,
}

impl DataSourceLayout {
    pub fn total_size(&self) -> u32 {
        self.buffer_size.saturating_mul(self.number_of_buffers)
    }

    /// Absolute offset of `signal` inside buffer copy `buffer`.
    pub fn offset_of(&self, signal: usize, buffer: u32) -> Option<u32> {
        self.signals
            .get(signal)
            .and_then(|s| buffer.checked_mul(self.buffer_size)?.checked_add(s.offset))
    }
}

/// The interface every data source variant implements.
pub trait DataSource: fmt::Debug + Send {
    fn class_name(&self) -> &'static str;

    /// Broker name for a signal, or `None` if the variant cannot serve it.
    fn broker_name(&self, query: &BrokerQuery<'_>, direction: Direction) -> Option<&'static str>;

    /// Number of concurrently valid buffer copies.
    fn number_of_buffers(&self) -> u32 {
        1
    }

    /// Whether signals may be consumed without any producer.
    fn allow_no_producers(&self) -> bool {
        false
    }

    /// Whether this source receives the generated timing signals.
    fn is_timing(&self) -> bool {
        false
    }

    fn allocate_memory(&mut self, layout: &DataSourceLayout) -> RtResult<()>;

    fn memory(&self) -> &[u8];

    fn memory_mut(&mut self) -> &mut [u8];

    /// Buffer copy brokers should use right now.
    fn active_buffer(&self) -> u32 {
        0
    }

    /// Bytes of `signal_index` in buffer copy `buffer_index`.
    fn signal_memory_buffer(&self, signal_index: usize, buffer_index: u32) -> RtResult<&[u8]>;

    /// Called between states; may switch buffers and apply defaults.
    fn prepare_next_state(&mut self, current: &str, next: &str) -> RtResult<()>;

    /// Blocking point of synchronised brokers.
    fn synchronise(&mut self) -> RtResult<()> {
        Ok(())
    }

    /// Sees the resolved `Data.<i>` record once every pass has completed.
    /// Signals, offsets and consuming functions are final at this point.
    fn post_configure(&mut self, _record: &ConfigTree) -> RtResult<()> {
        Ok(())
    }
}

/// Memory shared by the built-in variants.
#[derive(Debug, Clone, Default)]
pub struct DataSourceMemory {
    layout: DataSourceLayout,
    bytes: Vec<u8>,
}

impl DataSourceMemory {
    /// Allocate every buffer copy and fill it with the declared defaults.
    pub fn allocate(&mut self, layout: &DataSourceLayout) -> RtResult<()> {
        self.layout = layout.clone();
        self.bytes = vec![0; layout.total_size() as usize];
        for buffer in 0..layout.number_of_buffers {
            for index in 0..layout.signals.len() {
                self.write_default(index, buffer)?;
            }
        }
        Ok(())
    }

    pub fn layout(&self) -> &DataSourceLayout {
        &self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn span(&self, index: usize, buffer: u32) -> RtResult<std::ops::Range<usize>> {
        if buffer >= self.layout.number_of_buffers {
            return Err(RtError::IndexOob {
                what: "buffer index",
                index: buffer as usize,
                len: self.layout.number_of_buffers as usize,
            });
        }
        let signal = self.layout.signals.get(index).ok_or(RtError::IndexOob {
            what: "signal index",
            index,
            len: self.layout.signals.len(),
        })?;
        let start = buffer as usize * self.layout.buffer_size as usize + signal.offset as usize;
        Ok(start..start + signal.size as usize)
    }

    pub fn signal(&self, index: usize, buffer: u32) -> RtResult<&[u8]> {
        let span = self.span(index, buffer)?;
        Ok(&self.bytes[span])
    }

    pub fn signal_mut(&mut self, index: usize, buffer: u32) -> RtResult<&mut [u8]> {
        let span = self.span(index, buffer)?;
        Ok(&mut self.bytes[span])
    }

    /// Write the default (repeated per sample) into one buffer copy.
    pub fn write_default(&mut self, index: usize, buffer: u32) -> RtResult<bool> {
        let Some(default) = self.layout.signals[index].default.clone() else {
            return Ok(false);
        };
        if default.is_empty() {
            return Ok(false);
        }
        let slot = self.signal_mut(index, buffer)?;
        for chunk in slot.chunks_mut(default.len()) {
            let n = chunk.len().min(default.len());
            chunk[..n].copy_from_slice(&default[..n]);
        }
        Ok(true)
    }

    pub fn copy_buffer(&mut self, from: u32, to: u32) -> RtResult<()> {
        if from == to {
            return Ok(());
        }
        let size = self.layout.buffer_size as usize;
        if from.max(to) >= self.layout.number_of_buffers {
            return Err(RtError::IndexOob {
                what: "buffer index",
                index: from.max(to) as usize,
                len: self.layout.number_of_buffers as usize,
            });
        }
        let src = from as usize * size;
        self.bytes
            .copy_within(src..src + size, to as usize * size);
        Ok(())
    }

    /// Reset to default every signal idle in `current` but used in `next`.
    pub fn reset_entering_signals(&mut self, current: &str, next: &str, buffer: u32) -> RtResult<usize> {
        let entering: Vec<usize> = self
            .layout
            .signals
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.used_in(current) && s.used_in(next))
            .map(|(i, _)| i)
            .collect();
        let mut reset = 0;
        for index in entering {
            if self.write_default(index, buffer)? {
                reset += 1;
            }
        }
        Ok(reset)
    }
}

/// Encode a Default value for a signal of `elements` elements.
///
/// A scalar default is broadcast to every element. Vectors and matrices
/// must match the element count exactly; strings must fit a char8 array.
pub fn encode_default(
    signal: &str,
    basic: BasicType,
    elements: u32,
    value: &Value,
) -> BuildResult<Vec<u8>> {
    let elem = basic.byte_size() as usize;
    let n = elements as usize;
    let mut out = vec![0_u8; elem * n];
    let mismatch = |reason: String| BuildError::DefaultMismatch {
        signal: signal.to_string(),
        reason,
    };

    if let (BasicType::Char8, Value::Str(s)) = (basic, value) {
        if s.len() > n {
            return Err(mismatch(format!(
                "string of {} bytes does not fit {n} char8 element(s)",
                s.len()
            )));
        }
        out[..s.len()].copy_from_slice(s.as_bytes());
        return Ok(out);
    }

    let items: Vec<&Value> = if value.is_scalar() {
        vec![value; n]
    } else {
        let items = value.elements();
        if items.len() != n {
            return Err(mismatch(format!(
                "{} value(s) for {n} element(s)",
                items.len()
            )));
        }
        items
    };

    for (chunk, item) in out.chunks_mut(elem).zip(items) {
        let encoded = match item.as_i128() {
            Some(v) if !basic.is_float() => basic.encode_int(v, chunk),
            _ => match item.as_f64() {
                Some(v) => basic.encode_float(v, chunk),
                None => return Err(mismatch(format!("'{item}' is not a {basic}"))),
            },
        };
        encoded.map_err(|e| mismatch(e.to_string()))?;
    }
    Ok(out)
}

/// Constructor of a data source variant from its configuration node.
pub type DataSourceFactory =
    Box<dyn Fn(&str, &ConfigTree) -> BuildResult<Box<dyn DataSource>> + Send + Sync>;

/// Registry of data-source classes by name.
pub struct DataSourceCatalog {
    factories: IndexMap<String, DataSourceFactory>,
}

impl fmt::Debug for DataSourceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl Default for DataSourceCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        catalog.register(GamDataSource::CLASS, |name, node| {
            Ok(Box::new(GamDataSource::from_tree(name, node)?))
        });
        catalog.register(MemoryDataSource::CLASS, |name, node| {
            Ok(Box::new(MemoryDataSource::from_tree(name, node)?))
        });
        catalog.register(TimingDataSource::CLASS, |name, node| {
            Ok(Box::new(TimingDataSource::from_tree(name, node)?))
        });
        catalog
    }
}

impl DataSourceCatalog {
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    pub fn register<F>(&mut self, class: &str, factory: F)
    where
        F: Fn(&str, &ConfigTree) -> BuildResult<Box<dyn DataSource>> + Send + Sync + 'static,
    {
        self.factories.insert(class.to_string(), Box::new(factory));
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    pub fn create(&self, class: &str, name: &str, node: &ConfigTree) -> BuildResult<Box<dyn DataSource>> {
        let factory = self
            .factories
            .get(class)
            .ok_or_else(|| BuildError::UnknownDataSourceClass {
                data_source: name.to_string(),
                class: class.to_string(),
            })?;
        factory(name, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> DataSourceLayout {
        DataSourceLayout {
            name: "DDB1".into(),
            signals: vec![
                LayoutSignal {
                    name: "A".into(),
                    basic_type: BasicType::UInt32,
                    number_of_elements: 1,
                    offset: 0,
                    size: 4,
                    default: Some(vec![7, 0, 0, 0]),
                    states: vec!["S2".into()],
                },
                LayoutSignal {
                    name: "B".into(),
                    basic_type: BasicType::UInt16,
                    number_of_elements: 2,
                    offset: 4,
                    size: 4,
                    default: None,
                    states: vec!["S1".into(), "S2".into()],
                },
            ],
            buffer_size: 8,
            number_of_buffers: 2,
        }
    }

    #[test]
    fn allocate_applies_defaults_to_every_buffer() {
        let mut mem = DataSourceMemory::default();
        mem.allocate(&layout()).unwrap();
        assert_eq!(mem.bytes().len(), 16);
        assert_eq!(mem.signal(0, 0).unwrap(), &[7, 0, 0, 0]);
        assert_eq!(mem.signal(0, 1).unwrap(), &[7, 0, 0, 0]);
        assert!(mem.signal(2, 0).is_err());
        assert!(mem.signal(0, 2).is_err());
    }

    #[test]
    fn entering_signals_are_reset() {
        let mut mem = DataSourceMemory::default();
        mem.allocate(&layout()).unwrap();
        mem.signal_mut(0, 1).unwrap().copy_from_slice(&[1, 1, 1, 1]);
        assert_eq!(mem.reset_entering_signals("S1", "S2", 1).unwrap(), 1);
        assert_eq!(mem.signal(0, 1).unwrap(), &[7, 0, 0, 0]);
        assert_eq!(mem.reset_entering_signals("S2", "S1", 1).unwrap(), 0);
    }

    #[test]
    fn default_scalar_broadcasts() {
        let bytes = encode_default("S", BasicType::UInt16, 3, &Value::Int(2)).unwrap();
        assert_eq!(bytes, vec![2, 0, 2, 0, 2, 0]);
    }

    #[test]
    fn default_vector_must_match() {
        let v = Value::from(vec![1_i32, 2]);
        assert!(encode_default("S", BasicType::Int32, 2, &v).is_ok());
        let err = encode_default("S", BasicType::Int32, 3, &v).unwrap_err();
        assert!(matches!(err, BuildError::DefaultMismatch { .. }));
    }

    #[test]
    fn default_string_must_fit() {
        let ok = encode_default("S", BasicType::Char8, 4, &Value::from("ab")).unwrap();
        assert_eq!(ok, b"ab\0\0".to_vec());
        assert!(encode_default("S", BasicType::Char8, 1, &Value::from("ab")).is_err());
    }

    #[test]
    fn default_float_into_float() {
        let bytes = encode_default("S", BasicType::Float32, 1, &Value::Float(1.5)).unwrap();
        assert_eq!(bytes, 1.5_f32.to_le_bytes().to_vec());
    }

    #[test]
    fn unknown_class() {
        let catalog = DataSourceCatalog::default();
        let err = catalog.create("Nope", "X", &ConfigTree::new()).unwrap_err();
        assert!(matches!(err, BuildError::UnknownDataSourceClass { .. }));
        assert!(catalog.contains("GAMDataSource"));
    }
}
