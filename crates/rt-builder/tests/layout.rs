//! Layout properties over generated applications.

use proptest::prelude::*;
use rt_builder::ConfigurationBuilder;
use rt_signals::Direction;

const TYPES: [&str; 6] = ["uint8", "int16", "uint32", "float32", "float64", "int64"];

fn application(signals: &[(usize, u32)], buffers: u32) -> String {
    let mut producer = String::new();
    let mut consumer = String::new();
    for (i, (ty, elements)) in signals.iter().enumerate() {
        let decl = format!(
            "      Sig{i}: {{DataSource: DDB1, Type: {}, NumberOfElements: {elements}, NumberOfDimensions: {}}}\n",
            TYPES[*ty],
            u32::from(*elements > 1)
        );
        producer.push_str(&decl);
        consumer.push_str(&decl);
    }
    format!(
        "Functions:\n  GAMA:\n    OutputSignals:\n{producer}  GAMB:\n    InputSignals:\n{consumer}\
Data:\n  DDB1:\n    Class: MemoryDataSource\n    NumberOfBuffers: {buffers}\n\
States:\n  State1:\n    Threads:\n      Thread1:\n        Functions: [GAMA, GAMB]\n"
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn data_source_signals_never_overlap(
        signals in proptest::collection::vec((0_usize..TYPES.len(), 1_u32..6), 1..10),
        buffers in 1_u32..4,
    ) {
        let tree = rt_project::from_yaml_str(&application(&signals, buffers)).unwrap();
        let app = ConfigurationBuilder::new(&tree).unwrap().build().unwrap();
        let layout = app.layout("DDB1").unwrap();

        prop_assert_eq!(layout.signals.len(), signals.len());
        prop_assert_eq!(layout.number_of_buffers, buffers);
        let mut end = 0;
        for s in &layout.signals {
            prop_assert!(s.offset >= end, "{} starts inside its predecessor", s.name);
            prop_assert_eq!(s.offset % s.basic_type.alignment(), 0);
            end = s.offset + s.size;
        }
        prop_assert!(end <= layout.buffer_size);
        prop_assert_eq!(
            app.data_source("DDB1").unwrap().memory().len() as u32,
            layout.total_size()
        );
    }

    #[test]
    fn values_survive_the_round_trip(
        signals in proptest::collection::vec((0_usize..TYPES.len(), 1_u32..4), 1..6),
        seed in any::<u8>(),
    ) {
        let tree = rt_project::from_yaml_str(&application(&signals, 1)).unwrap();
        let mut app = ConfigurationBuilder::new(&tree).unwrap().build().unwrap();
        let gama = app.function_mut("GAMA").unwrap();
        for (i, byte) in gama.memory.iter_mut().enumerate() {
            *byte = seed.wrapping_add(i as u8);
        }
        app.execute_outputs("GAMA").unwrap();
        app.execute_inputs("GAMB").unwrap();
        for i in 0..signals.len() {
            let name = format!("Sig{i}");
            let written = app.read_signal("GAMA", Direction::Output, &name).unwrap().to_vec();
            let read = app.read_signal("GAMB", Direction::Input, &name).unwrap();
            prop_assert_eq!(written.as_slice(), read);
        }
    }
}
