//! The resolved database as configuration trees: written back into the
//! builder's own tree after each pass, and exported from there.

use rt_signals::{Direction, attr};
use rt_tree::{ConfigTree, Value};

use crate::builder::ConfigurationBuilder;
use crate::database::{DataSourceRecord, FunctionRecord, MemoryBlock, Usage};
use crate::error::BuildResult;
use crate::passes::DATA;

const MEMORY: &str = "Memory";
const STATES: &str = "States";
const SIGNALS: &str = "Signals";
const FUNCTIONS: &str = "Functions";

fn usage_lists(tree: &mut ConfigTree, role: &str, usages: &[Usage]) -> BuildResult<()> {
    if usages.is_empty() {
        return Ok(());
    }
    let ids: Vec<u32> = usages.iter().map(|u| u.function.index()).collect();
    let names: Vec<&str> = usages.iter().map(|u| u.function_name.as_str()).collect();
    let signals: Vec<&str> = usages.iter().map(|u| u.signal.as_str()).collect();
    tree.write(&format!("GAM{role}"), ids)?;
    tree.write(&format!("GAMNames{role}"), names)?;
    tree.write(&format!("Signal{role}"), signals)?;
    Ok(())
}

fn write_block(tree: &mut ConfigTree, block: &MemoryBlock) -> BuildResult<()> {
    tree.write(attr::DATA_SOURCE, block.data_source.as_str())?;
    tree.write(attr::BYTE_SIZE, block.byte_size)?;
    tree.create_relative(SIGNALS)?;
    for (m, slot) in block.signals.iter().enumerate() {
        tree.create_relative(&m.to_string())?;
        tree.write(attr::QUALIFIED_NAME, slot.qualified_name.as_str())?;
        tree.write(attr::ALIAS, slot.remote_name.as_str())?;
        let rows: Vec<Vec<u32>> = slot.byte_offsets.iter().map(|r| r.to_vec()).collect();
        tree.write("ByteOffset", rows)?;
        tree.write(attr::SAMPLES, slot.samples)?;
        if let Some(f) = slot.frequency {
            tree.write(attr::FREQUENCY, f)?;
        }
        if let Some(t) = slot.trigger {
            tree.write(attr::TRIGGER, t)?;
        }
        tree.write("GAMMemoryOffset", slot.gam_memory_offset)?;
        if let Some(kind) = slot.broker {
            tree.write("Broker", kind.name())?;
        }
        tree.move_to_ancestor(1)?;
    }
    tree.move_to_ancestor(1)?;
    Ok(())
}

fn write_function(tree: &mut ConfigTree, record: &FunctionRecord) -> BuildResult<()> {
    tree.write(attr::QUALIFIED_NAME, record.qualified_name.as_str())?;
    if let Some(class) = &record.class {
        tree.write("Class", class.as_str())?;
    }
    if !record.states.is_empty() {
        tree.create_relative(STATES)?;
        for (state, threads) in &record.states {
            match threads.as_slice() {
                [one] => tree.write(state, one.as_str())?,
                many => tree.write(state, many.to_vec())?,
            }
        }
        tree.move_to_ancestor(1)?;
    }

    tree.create_relative(SIGNALS)?;
    for direction in Direction::BOTH {
        let side = record.side(direction);
        if side.signals.is_empty() {
            continue;
        }
        tree.create_relative(direction.node_name())?;
        for (j, signal) in side.signals.iter().enumerate() {
            tree.create_relative(&j.to_string())?;
            signal.write_to(tree)?;
            tree.move_to_ancestor(1)?;
        }
        tree.move_to_ancestor(1)?;
    }
    tree.move_to_ancestor(1)?;

    if record.inputs.blocks.len() + record.outputs.blocks.len() > 0 {
        tree.create_relative(MEMORY)?;
        for direction in Direction::BOTH {
            let blocks = &record.side(direction).blocks;
            if blocks.is_empty() {
                continue;
            }
            tree.create_relative(direction.node_name())?;
            for (k, block) in blocks.iter().enumerate() {
                tree.create_relative(&k.to_string())?;
                write_block(tree, block)?;
                tree.move_to_ancestor(1)?;
            }
            tree.move_to_ancestor(1)?;
        }
        tree.move_to_ancestor(1)?;
    }
    tree.write(attr::BYTE_SIZE, record.byte_size)?;
    Ok(())
}

fn write_data_source(tree: &mut ConfigTree, ds: &DataSourceRecord) -> BuildResult<()> {
    tree.write(attr::QUALIFIED_NAME, ds.qualified_name.as_str())?;
    tree.write("Class", ds.class.as_str())?;
    tree.write("NumberOfBuffers", ds.object.number_of_buffers())?;
    tree.write("IsTimingDataSource", u32::from(ds.is_timing()))?;
    if let Some(layout) = &ds.layout {
        tree.write(attr::BYTE_SIZE, layout.total_size())?;
    }
    if ds.locked {
        tree.write(attr::LOCKED, 1_u32)?;
    }
    if ds.allow_no_producers {
        tree.write(attr::ALLOW_NO_PRODUCERS, 1_u32)?;
    }

    tree.create_relative(SIGNALS)?;
    for (j, (name, signal)) in ds.signals.iter().enumerate() {
        tree.create_relative(&j.to_string())?;
        signal.descriptor.write_to(tree)?;
        if let Some(placed) = ds.layout.as_ref().and_then(|l| l.signals.iter().find(|s| &s.name == name)) {
            tree.write("Offset", placed.offset)?;
        }
        if !signal.states.is_empty() {
            tree.create_relative(STATES)?;
            for (state, usage) in &signal.states {
                tree.create_relative(state)?;
                usage_lists(tree, "Consumers", &usage.consumers)?;
                usage_lists(tree, "Producers", &usage.producers)?;
                tree.move_to_ancestor(1)?;
            }
            tree.move_to_ancestor(1)?;
        }
        tree.move_to_ancestor(1)?;
    }
    tree.move_to_ancestor(1)?;

    if !ds.functions.is_empty() {
        tree.create_relative(FUNCTIONS)?;
        for (k, user) in ds.functions.iter().enumerate() {
            tree.create_relative(&k.to_string())?;
            tree.write(attr::QUALIFIED_NAME, user.qualified_name.as_str())?;
            tree.write(attr::BYTE_SIZE, user.byte_size)?;
            tree.create_relative(SIGNALS)?;
            for (m, signal) in user.signals.iter().enumerate() {
                tree.create_relative(&m.to_string())?;
                tree.write(attr::QUALIFIED_NAME, signal.qualified_name.as_str())?;
                tree.write(attr::ALIAS, signal.remote_name.as_str())?;
                tree.write("Direction", signal.direction.node_name())?;
                tree.write(attr::BYTE_SIZE, signal.byte_size)?;
                if let Some(kind) = signal.broker {
                    tree.write("Broker", kind.name())?;
                }
                tree.move_to_ancestor(1)?;
            }
            tree.move_to_ancestor(2)?;
        }
        tree.move_to_ancestor(1)?;
    }
    Ok(())
}

/// Empty the root child `name`, creating it if needed, and move into it.
pub(crate) fn clear_node(tree: &mut ConfigTree, name: &str) -> BuildResult<()> {
    tree.move_to_root();
    if tree.is_node(name) {
        tree.move_relative(name)?;
        tree.purge();
    } else {
        tree.create_relative(name)?;
    }
    Ok(())
}

/// Copy the root child `name` of `tree` into the current node of `dest`.
fn export_node(tree: &mut ConfigTree, name: &str, dest: &mut ConfigTree) -> BuildResult<()> {
    dest.purge();
    tree.move_to_root();
    if tree.is_node(name) {
        tree.move_relative(name)?;
        tree.copy(dest)?;
    }
    Ok(())
}

impl ConfigurationBuilder {
    /// Rewrite the `Functions` and `Data` subtrees with the database as it
    /// stands.
    pub(crate) fn materialise(&mut self) -> BuildResult<()> {
        let tree = &mut self.tree;
        clear_node(tree, FUNCTIONS)?;
        for (i, record) in self.db.functions.iter().enumerate() {
            tree.create_relative(&i.to_string())?;
            write_function(tree, record)?;
            tree.move_to_ancestor(1)?;
        }

        clear_node(tree, DATA)?;
        for (i, ds) in self.db.data_sources.values().enumerate() {
            tree.create_relative(&i.to_string())?;
            write_data_source(tree, ds)?;
            tree.move_to_ancestor(1)?;
        }
        tree.move_to_root();
        Ok(())
    }

    /// Copy the resolved functions into the current node of `functions_dest`
    /// and the data sources into that of `data_dest`. Both nodes are
    /// cleared first; both cursors are preserved.
    pub fn copy(&self, functions_dest: &mut ConfigTree, data_dest: &mut ConfigTree) -> BuildResult<()> {
        let mut tree = self.tree.clone();
        export_node(&mut tree, FUNCTIONS, functions_dest)?;
        export_node(&mut tree, DATA, data_dest)?;
        Ok(())
    }

    /// Write the resolved state table (`State.Thread = [functions]`).
    pub fn copy_states(&self, dest: &mut ConfigTree) -> BuildResult<()> {
        dest.purge();
        for (state, threads) in &self.db.states {
            dest.create_relative(state)?;
            for (thread, ids) in threads {
                let names: Vec<Value> = ids
                    .iter()
                    .map(|id| Value::from(self.db.function(*id).qualified_name.as_str()))
                    .collect();
                dest.write(thread, Value::Vector(names))?;
            }
            dest.move_to_ancestor(1)?;
        }
        Ok(())
    }
}
