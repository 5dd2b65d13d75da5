//! Memory controller behaviour against simulated masters.

use std::thread;
use std::time::Duration;

use master_link::{FaultPlan, SimHandle, SimulatedMaster, Transport, TransportConfig};
use master_memory::{
    CancelToken, ControllerState, ExtensionKey, ExtensionStore, FieldValue, InvalidateScope, JsonExtensionStore,
    MemoryConfig, MemoryController, MemoryError, MemoryExtensionStore, PageId, ValidationError,
};
use master_protocol::{
    HardwareFamily, MemoryType, ProtocolError, CLASSIC_ACTIVATE_EEPROM, CLASSIC_READ_EEPROM, CLASSIC_WRITE_EEPROM,
    CORE_MEMORY_READ, CORE_MEMORY_WRITE,
};
use parking_lot::Mutex;

fn controller(family: HardwareFamily) -> (MemoryController, SimHandle) {
    let (sim, handle) = SimulatedMaster::new(family);
    let config = TransportConfig::for_family(family).with_timeout(Duration::from_millis(20));
    let link = Mutex::new(Transport::new(sim, config));
    (MemoryController::for_link(family, link, MemoryConfig::default()), handle)
}

fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

// ============================================================================
// Loading and saving
// ============================================================================

#[test]
fn test_core_timer_type_keeps_neighbours() {
    let (c, handle) = controller(HardwareFamily::Core);
    handle.set_memory(MemoryType::Eeprom, 1, 7, &[0, 50, 0, 60, 0, 70, 0, 80]);
    handle.set_memory(MemoryType::Eeprom, 1, 23, &[1, 1, 1, 1, 2, 2, 2, 2]);
    handle.set_memory(MemoryType::Eeprom, 1, 176, b"Hall");
    let before = handle.memory(MemoryType::Eeprom, 1);

    let mut output = c.load("OutputConfiguration", 3).expect("load");
    assert_eq!(output.get("timer_type").expect("get"), FieldValue::Enum("PER_100_MS".into()));
    output.set("timer_type", "ABSOLUTE").expect("set");
    output.save().expect("save");

    let writes = handle.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!((writes[0].page, writes[0].start, writes[0].length), (1, 26, 1));
    assert_eq!(handle.activations(), 1);

    drop(output);
    c.invalidate(InvalidateScope::All).expect("invalidate");
    let output = c.load("OutputConfiguration", 3).expect("reload");
    assert_eq!(output.get("timer_type").expect("get"), FieldValue::Enum("ABSOLUTE".into()));
    assert_eq!(output.get("timer_value").expect("get"), FieldValue::Int(80));
    assert_eq!(output.get("name").expect("get"), text("Hall"));

    let after = handle.memory(MemoryType::Eeprom, 1);
    let changed: Vec<usize> = (0..256).filter(|&i| before[i] != after[i]).collect();
    assert_eq!(changed, vec![26]);
    assert_eq!(after[26], 3);
}

#[test]
fn test_save_then_refresh_classic() {
    let (c, handle) = controller(HardwareFamily::Classic);
    let mut output = c.load("OutputConfiguration", 2).expect("load");
    output.set("name", "Kitchen").expect("set");
    assert!(output.is_dirty());
    output.save().expect("save");
    assert!(!output.is_dirty());

    output.refresh().expect("refresh");
    assert_eq!(output.get("name").expect("get"), text("Kitchen"));
    assert_eq!(&handle.memory(MemoryType::Eeprom, 33)[52..59], b"Kitchen");
    assert_eq!(handle.command_count(CLASSIC_ACTIVATE_EEPROM), 1);
}

#[test]
fn test_save_then_refresh_core() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut input = c.load("InputConfiguration", 9).expect("load");
    input.set("name", "Doorbell").expect("set");
    input.set("input_link.output_id", 12).expect("set member");
    input.save().expect("save");

    input.refresh().expect("refresh");
    assert_eq!(input.get("name").expect("get"), text("Doorbell"));
    assert_eq!(input.get("input_link.output_id").expect("get"), FieldValue::Int(12));
    // untouched members keep the erased bits
    assert_eq!(input.get("input_link.dimming_up").expect("get"), FieldValue::Bool(true));
    assert_eq!(&handle.memory(MemoryType::Eeprom, 83)[144..152], b"Doorbell");
}

#[test]
fn test_writes_bounded_by_pages() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut output = c.load("OutputConfiguration", 0).expect("load");
    output.set("timer_value", 300).expect("timer");
    output.set("max_output_level", 200).expect("level");
    output.set("name", "Porch").expect("name");
    output.set("status.on", true).expect("status");
    handle.reset_counts();
    output.save().expect("save");

    // two pages, two write commands
    assert_eq!(handle.command_count(CORE_MEMORY_WRITE), 2);
    let writes = handle.writes();
    let eeprom: Vec<_> = writes.iter().filter(|w| w.memory == MemoryType::Eeprom).collect();
    let fram: Vec<_> = writes.iter().filter(|w| w.memory == MemoryType::Fram).collect();
    assert_eq!(eeprom.len(), 1);
    assert_eq!((eeprom[0].page, eeprom[0].start, eeprom[0].length), (1, 7, 126));
    assert_eq!(fram.len(), 1);
    assert_eq!((fram[0].page, fram[0].start, fram[0].length), (1, 0, 1));
    assert_eq!(handle.memory(MemoryType::Fram, 1)[0], 1);
    assert_eq!(c.stats().page_writes, 2);
}

#[test]
fn test_read_only_and_unknown_fields() {
    let (c, _handle) = controller(HardwareFamily::Core);
    let mut module = c.load("OutputModuleConfiguration", 0).expect("load");
    assert!(matches!(
        module.set("firmware_version", "1.2.3"),
        Err(MemoryError::Validation(ValidationError::ReadOnly { .. }))
    ));
    assert!(matches!(
        module.get("nope"),
        Err(MemoryError::Validation(ValidationError::UnknownField { .. }))
    ));
    assert!(matches!(c.load("Nope", 0), Err(MemoryError::UnknownModel(_))));
    assert!(!module.is_dirty());
}

#[test]
fn test_record_count_follows_module_count() {
    let (c, handle) = controller(HardwareFamily::Core);
    handle.set_memory(MemoryType::Eeprom, 0, 1, &[1]);
    assert_eq!(c.record_count("OutputConfiguration").expect("count"), 8);
    assert!(c.load("OutputConfiguration", 7).is_ok());
    assert!(matches!(
        c.load("OutputConfiguration", 8),
        Err(MemoryError::RecordNotFound { index: 8, count: 8, .. })
    ));
    assert_eq!(c.record_count("GroupActionConfiguration").expect("fixed"), 256);
}

#[test]
fn test_validation_stages_nothing() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut output = c.load("OutputConfiguration", 0).expect("load");
    assert!(output.set("timer_type", "SOMETIMES").is_err());
    assert!(output.set("name", "a name longer than sixteen").is_err());
    assert!(output.set("dali_mapping.dali_output_id", 64).is_err());
    assert!(!output.is_dirty());
    output.save().expect("nothing to save");
    assert!(handle.writes().is_empty());
    assert_eq!(handle.activations(), 0);
}

#[test]
fn test_dropped_instance_leaves_no_staging() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut first = c.load("OutputConfiguration", 0).expect("load");
    first.set("name", "Ghost").expect("set");
    assert_eq!(first.get("name").expect("own value"), text("Ghost"));

    let mut second = c.load("OutputConfiguration", 0).expect("second load");
    assert_eq!(second.get("name").expect("device value"), text(""));
    drop(first);

    let mut third = c.load("OutputConfiguration", 0).expect("fresh load");
    assert_eq!(third.get("name").expect("get"), text(""));
    third.refresh().expect("refresh");
    assert_eq!(third.get("name").expect("after refresh"), text(""));

    second.set("min_output_level", 3).expect("set");
    second.save().expect("save");
    assert!(handle.memory(MemoryType::Eeprom, 1)[128..133].iter().all(|&b| b == 255));
    assert_eq!(handle.memory(MemoryType::Eeprom, 1)[39], 3);
}

#[test]
fn test_sibling_members_staged_apart() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut first = c.load("InputConfiguration", 9).expect("load");
    let mut second = c.load("InputConfiguration", 9).expect("load");
    first.set("input_link.output_id", 12).expect("set");
    second.set("input_link.dimming_up", false).expect("set");
    assert_eq!(second.get("input_link.output_id").expect("get"), FieldValue::Int(1023));
    second.save().expect("save");
    assert_eq!(&handle.memory(MemoryType::Eeprom, 84)[2..4], &[0xF7, 0xFF]);

    // the unsaved member still sits over the saved one
    assert_eq!(first.get("input_link.output_id").expect("get"), FieldValue::Int(12));
    assert_eq!(first.get("input_link.dimming_up").expect("get"), FieldValue::Bool(false));
    drop(first);

    c.invalidate(InvalidateScope::All).expect("invalidate");
    let input = c.load("InputConfiguration", 9).expect("reload");
    assert_ne!(input.get("input_link.output_id").expect("get"), FieldValue::Int(12));
    assert_eq!(input.get("input_link.dimming_up").expect("get"), FieldValue::Bool(false));
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_get_after_invalidate_reads_once_classic() {
    let (c, handle) = controller(HardwareFamily::Classic);
    let output = c.load("OutputConfiguration", 1).expect("load");
    output.get("name").expect("cached");

    c.invalidate(InvalidateScope::Page(PageId::eeprom(33))).expect("invalidate");
    handle.reset_counts();
    output.get("name").expect("get");
    output.get("timer").expect("cached again");
    assert_eq!(handle.command_count(CLASSIC_READ_EEPROM), 1);
    assert_eq!(handle.total_commands(), 1);
}

#[test]
fn test_get_after_invalidate_reads_once_core() {
    let (c, handle) = controller(HardwareFamily::Core);
    let output = c.load("OutputConfiguration", 1).expect("load");

    c.invalidate(InvalidateScope::Page(PageId::eeprom(1))).expect("invalidate");
    handle.reset_counts();
    output.get("name").expect("get");
    output.get("timer_value").expect("cached again");
    // 256 byte page in 32 byte chunks
    assert_eq!(handle.command_count(CORE_MEMORY_READ), 8);
    assert_eq!(handle.total_commands(), 8);
}

#[test]
fn test_load_many_reads_shared_pages_once() {
    let (c, handle) = controller(HardwareFamily::Core);
    let outputs = c.load_many("OutputConfiguration", &[0, 1, 2, 3, 4, 5, 6, 7]).expect("load");
    assert_eq!(outputs.len(), 8);
    // count page, eeprom page 1, fram page 1
    assert_eq!(handle.command_count(CORE_MEMORY_READ), 3 * 8);
    assert_eq!(c.stats().page_reads, 3);
    assert_eq!(c.cached_pages().get("eeprom"), Some(&2));
    assert_eq!(c.cached_pages().get("fram"), Some(&1));
}

#[test]
fn test_stale_write_after_invalidate() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut output = c.load("OutputConfiguration", 0).expect("load");
    output.set("name", "Hall").expect("set");
    c.invalidate(InvalidateScope::Page(PageId::eeprom(1))).expect("invalidate");

    assert!(matches!(output.save(), Err(MemoryError::StaleWrite { page }) if page == PageId::eeprom(1)));
    assert!(matches!(output.set("min_output_level", 3), Err(MemoryError::StaleWrite { .. })));
    assert!(handle.writes().is_empty());

    output.refresh().expect("refresh");
    output.set("min_output_level", 3).expect("set after refresh");
    output.save().expect("save");
    assert_eq!(handle.memory(MemoryType::Eeprom, 1)[39], 3);
}

#[test]
fn test_resync_rereads_cached_pages() {
    let (c, handle) = controller(HardwareFamily::Core);
    let output = c.load("OutputConfiguration", 0).expect("load");
    handle.set_memory(MemoryType::Eeprom, 1, 128, b"Garage");
    assert_eq!(output.get("name").expect("cached"), text(""));

    let pages = c.resync(InvalidateScope::Bank(master_memory::MemoryBank::Eeprom)).expect("resync");
    assert_eq!(pages, vec![PageId::eeprom(0), PageId::eeprom(1)]);
    assert_eq!(c.state(), ControllerState::Idle);
    assert_eq!(output.get("name").expect("fresh"), text("Garage"));
    assert_eq!(c.stats().page_reads, 3 + 2);
}

#[test]
fn test_external_activation_invalidates_cache() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut output = c.load("OutputConfiguration", 0).expect("load");
    let reads = c.stats().page_reads;

    handle.set_memory(MemoryType::Eeprom, 1, 128, b"Attic");
    handle.inject_eeprom_activation();
    assert_eq!(output.get("name").expect("get"), text("Attic"));
    assert!(c.stats().invalidations >= 3);
    assert_eq!(c.stats().page_reads, reads + 1);

    assert!(matches!(output.set("name", "Cellar"), Err(MemoryError::StaleWrite { .. })));
}

#[test]
fn test_own_activation_keeps_cache() {
    let (c, _handle) = controller(HardwareFamily::Core);
    let mut output = c.load("OutputConfiguration", 0).expect("load");
    output.set("name", "Hall").expect("set");
    output.save().expect("save");
    output.set("name", "Hallway").expect("no invalidation after own commit");
    assert_eq!(c.stats().invalidations, 0);
}

// ============================================================================
// Batches
// ============================================================================

#[test]
fn test_save_many_commits_once() {
    let (c, handle) = controller(HardwareFamily::Classic);
    let mut outputs = c.load_many("OutputConfiguration", &[0, 8]).expect("load");
    outputs[0].set("name", "Kitchen").expect("set");
    outputs[1].set("name", "Hall").expect("set");

    let report = c.save_many(&mut outputs).expect("save");
    assert!(report.is_success());
    assert_eq!(report.entries.len(), 2);
    assert_eq!(handle.command_count(CLASSIC_WRITE_EEPROM), 2);
    assert_eq!(handle.command_count(CLASSIC_ACTIVATE_EEPROM), 1);
}

#[test]
fn test_save_many_partial_report() {
    let (c, handle) = controller(HardwareFamily::Core);
    handle.refuse_writes(MemoryType::Eeprom, 2);
    let mut outputs = c.load_many("OutputConfiguration", &[0, 8]).expect("load");
    outputs[0].set("name", "Kitchen").expect("set");
    outputs[1].set("name", "Hall").expect("set");

    let report = c.save_many(&mut outputs).expect("save");
    assert!(!report.is_success());
    assert!(report.commit.is_ok());
    assert!(report.entries[0].result.is_ok());
    assert!(matches!(
        &report.entries[1].result,
        Err(MemoryError::Protocol(ProtocolError::WriteRejected(_)))
    ));
    assert_eq!(report.failures().map(|e| e.index).collect::<Vec<_>>(), vec![8]);
    assert_eq!(handle.activations(), 1);
    assert!(!outputs[0].is_dirty());
    assert!(outputs[1].is_dirty());

    handle.accept_writes();
    c.save(&mut outputs[1]).expect("retry");
    assert_eq!(&handle.memory(MemoryType::Eeprom, 2)[128..132], b"Hall");
}

// ============================================================================
// Faults, cancellation and concurrency
// ============================================================================

#[test]
fn test_dropped_replies_within_retries() {
    let (c, handle) = controller(HardwareFamily::Core);
    handle.set_faults(FaultPlan {
        drop_replies: 2,
        ..FaultPlan::default()
    });
    let output = c.load("OutputConfiguration", 0).expect("load survives two drops");
    assert_eq!(output.get("name").expect("get"), text(""));
}

#[test]
fn test_dropped_replies_beyond_retries() {
    let (c, handle) = controller(HardwareFamily::Classic);
    handle.set_faults(FaultPlan {
        drop_replies: 3,
        ..FaultPlan::default()
    });
    assert!(matches!(
        c.load("OutputConfiguration", 0),
        Err(MemoryError::Communication(_))
    ));
    assert_eq!(c.state(), ControllerState::Idle);
    assert!(c.load("OutputConfiguration", 0).is_ok());
}

#[test]
fn test_corrupted_replies_within_retries_on_save() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut output = c.load("OutputConfiguration", 0).expect("load");
    output.set("name", "Hall").expect("set");
    handle.set_faults(FaultPlan {
        corrupt_replies: 2,
        ..FaultPlan::default()
    });
    output.save().expect("save survives two corrupt replies");
    assert!(!output.is_dirty());
    assert_eq!(&handle.memory(MemoryType::Eeprom, 1)[128..132], b"Hall");
    assert_eq!(handle.memory(MemoryType::Eeprom, 1)[132], 255);
}

#[test]
fn test_corrupted_replies_beyond_retries_on_save() {
    let (c, handle) = controller(HardwareFamily::Core);
    let mut output = c.load("OutputConfiguration", 0).expect("load");
    output.set("name", "Hall").expect("set");
    handle.set_faults(FaultPlan {
        corrupt_replies: 3,
        ..FaultPlan::default()
    });
    assert!(matches!(output.save(), Err(MemoryError::Communication(_))));
    assert!(output.is_dirty());
    assert_eq!(c.state(), ControllerState::Idle);

    output.save().expect("save once the link recovers");
    assert!(!output.is_dirty());
    assert_eq!(output.get("name").expect("get"), text("Hall"));
    assert_eq!(&handle.memory(MemoryType::Eeprom, 1)[128..132], b"Hall");
}

#[test]
fn test_cancelled_operations_dispatch_nothing() {
    let (c, handle) = controller(HardwareFamily::Core);
    let token = CancelToken::new();
    let mut output = c.load_with("OutputConfiguration", 0, &token).expect("load");
    output.set("name", "Hall").expect("set");
    handle.reset_counts();

    token.cancel();
    assert!(matches!(
        c.load_with("OutputConfiguration", 1, &token),
        Err(MemoryError::Cancelled)
    ));
    assert!(matches!(c.save_with(&mut output, &token), Err(MemoryError::Cancelled)));
    assert!(matches!(
        c.resync_with(InvalidateScope::All, &token),
        Err(MemoryError::Cancelled)
    ));
    assert_eq!(handle.total_commands(), 0);
    assert!(output.is_dirty());
    assert_eq!(c.state(), ControllerState::Idle);
}

#[test]
fn test_concurrent_callers() {
    let (c, handle) = controller(HardwareFamily::Core);
    thread::scope(|s| {
        for index in 0..4u16 {
            let c = &c;
            s.spawn(move || {
                let mut output = c.load("OutputConfiguration", index).expect("load");
                output.set("name", format!("Output {}", index)).expect("set");
                output.save().expect("save");
            });
        }
    });

    assert_eq!(handle.activations(), 4);
    let page = handle.memory(MemoryType::Eeprom, 1);
    for index in 0..4usize {
        let offset = 128 + index * 16;
        assert_eq!(&page[offset..offset + 8], format!("Output {}", index).as_bytes());
    }
    for index in 0..4 {
        let output = c.load("OutputConfiguration", index).expect("load");
        assert_eq!(output.get("name").expect("get"), text(&format!("Output {}", index)));
    }
    assert_eq!(c.state(), ControllerState::Idle);
}

#[test]
fn test_raw_access() {
    let (c, handle) = controller(HardwareFamily::Core);
    c.write_raw(PageId::eeprom(10), 4, &[1, 2, 3]).expect("write");
    assert_eq!(handle.activations(), 1);
    let page = c.read_raw(PageId::eeprom(10)).expect("read");
    assert_eq!(page[4..7], [1, 2, 3]);
    assert!(matches!(
        c.read_raw(PageId::fram(500)),
        Err(MemoryError::PageOutOfRange { .. })
    ));
}

// ============================================================================
// Extension fields
// ============================================================================

#[test]
fn test_extension_store_shadows_memory() {
    let (c, handle) = controller(HardwareFamily::Classic);
    let mut store = MemoryExtensionStore::new();
    store
        .set(ExtensionKey::new("ShutterConfiguration", 1, "name"), "Override".into())
        .expect("preset");
    let c = c.with_extension_store(Box::new(store));

    let mut shutter = c.load("ShutterConfiguration", 1).expect("load");
    assert_eq!(shutter.get("name").expect("shadowed"), text("Override"));
    assert_eq!(shutter.get("steps").expect("default"), FieldValue::Int(65535));

    shutter.set("steps", 120u16).expect("set");
    assert_eq!(shutter.get("steps").expect("staged"), FieldValue::Int(120));
    shutter.save().expect("save");
    assert!(!shutter.is_dirty());
    assert!(handle.writes().is_empty());
    assert_eq!(handle.activations(), 0);

    let shutter = c.load("ShutterConfiguration", 1).expect("reload");
    assert_eq!(shutter.get("steps").expect("stored"), FieldValue::Int(120));
    let other = c.load("ShutterConfiguration", 2).expect("load");
    assert_eq!(other.get("steps").expect("default"), FieldValue::Int(65535));
}

#[test]
fn test_extension_without_store() {
    let (c, _handle) = controller(HardwareFamily::Classic);
    let mut pump = c.load("PumpGroupConfiguration", 0).expect("load");
    assert_eq!(pump.get("room").expect("default"), FieldValue::Int(255));
    assert!(matches!(pump.set("room", 3), Err(MemoryError::NoExtensionStore)));
    assert!(matches!(
        pump.set("room", 300),
        Err(MemoryError::NoExtensionStore) | Err(MemoryError::Validation(_))
    ));
}

#[test]
fn test_json_extension_store_through_controller() {
    let path = std::env::temp_dir().join(format!("master-memory-controller-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    {
        let (c, _handle) = controller(HardwareFamily::Classic);
        let c = c.with_extension_store(Box::new(JsonExtensionStore::open(&path).expect("open")));
        let mut thermostat = c.load("ThermostatConfiguration", 4).expect("load");
        assert!(matches!(
            thermostat.set("room", 300),
            Err(MemoryError::Validation(ValidationError::OutOfRange { .. }))
        ));
        thermostat.set("room", 7).expect("set");
        thermostat.set("setp0", 21.5).expect("set memory field");
        thermostat.save().expect("save");
    }

    let store = JsonExtensionStore::open(&path).expect("reopen");
    assert_eq!(
        store.get(&ExtensionKey::new("ThermostatConfiguration", 4, "room")).as_deref(),
        Some("7")
    );
    let _ = std::fs::remove_file(&path);
}
