//! Model table of classic masters.
//!
//! Classic words are little-endian and booleans are inverted. Basic actions
//! are two byte pairs. Module counts live in bank 0.

use crate::address::AddressSpec;
use crate::field::{ByteOrder, FieldKind};
use crate::model::{FieldDescriptor, ModelDefinition, RecordCount};

const WORD: FieldKind = FieldKind::Word(ByteOrder::Little);
const NAME: FieldKind = FieldKind::Text { length: 16 };
const MODULE_TYPE: FieldKind = FieldKind::Text { length: 1 };

// ============================================================================
// Outputs and inputs
// ============================================================================

/// One output, eight per module.
pub static OUTPUT_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "OutputConfiguration",
    records: RecordCount::per_module(0, 2, 8, 240),
    fields: &[
        FieldDescriptor::eeprom("module_type", MODULE_TYPE, AddressSpec::paged(33, 8, 0, 0))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(33, 8, 20, 16)),
        FieldDescriptor::eeprom("timer", WORD, AddressSpec::paged(33, 8, 4, 2)),
        FieldDescriptor::eeprom("type", FieldKind::Byte, AddressSpec::paged(33, 8, 149, 1)),
        FieldDescriptor::eeprom("lock_bit_id", FieldKind::Byte, AddressSpec::row(231, 0, 1)),
        FieldDescriptor::eeprom("can_led_1_id", FieldKind::Byte, AddressSpec::paged(221, 32, 0, 8)),
        FieldDescriptor::eeprom("can_led_1_function", FieldKind::Byte, AddressSpec::paged(221, 32, 1, 8)),
        FieldDescriptor::eeprom("can_led_2_id", FieldKind::Byte, AddressSpec::paged(221, 32, 2, 8)),
        FieldDescriptor::eeprom("can_led_2_function", FieldKind::Byte, AddressSpec::paged(221, 32, 3, 8)),
        FieldDescriptor::eeprom("can_led_3_id", FieldKind::Byte, AddressSpec::paged(221, 32, 4, 8)),
        FieldDescriptor::eeprom("can_led_3_function", FieldKind::Byte, AddressSpec::paged(221, 32, 5, 8)),
        FieldDescriptor::eeprom("can_led_4_id", FieldKind::Byte, AddressSpec::paged(221, 32, 6, 8)),
        FieldDescriptor::eeprom("can_led_4_function", FieldKind::Byte, AddressSpec::paged(221, 32, 7, 8)),
    ],
};

/// One input, eight per module.
pub static INPUT_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "InputConfiguration",
    records: RecordCount::per_module(0, 1, 8, 240),
    fields: &[
        FieldDescriptor::eeprom("module_type", MODULE_TYPE, AddressSpec::paged(2, 8, 0, 0))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom("name", FieldKind::Text { length: 8 }, AddressSpec::paged(115, 32, 0, 8)),
        FieldDescriptor::eeprom("action", FieldKind::Byte, AddressSpec::paged(2, 8, 4, 1)),
        FieldDescriptor::eeprom(
            "basic_actions",
            FieldKind::List { length: 30, unit: 2 },
            AddressSpec::paged(2, 8, 12, 30),
        ),
        FieldDescriptor::eeprom("invert", FieldKind::Byte, AddressSpec::row(32, 0, 1)),
        FieldDescriptor::eeprom("can", MODULE_TYPE, AddressSpec::paged(2, 8, 252, 0))
            .read_only()
            .shared(),
    ],
};

// ============================================================================
// Shutters
// ============================================================================

/// One shutter, four per module.
pub static SHUTTER_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "ShutterConfiguration",
    records: RecordCount::per_module(0, 3, 4, 120),
    fields: &[
        FieldDescriptor::eeprom("timer_up", FieldKind::Byte, AddressSpec::paged(33, 4, 177, 2)),
        FieldDescriptor::eeprom("timer_down", FieldKind::Byte, AddressSpec::paged(33, 4, 178, 2)),
        FieldDescriptor::eeprom("up_down_config", FieldKind::Byte, AddressSpec::paged(33, 4, 185, 1)),
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(33, 4, 189, 16)),
        FieldDescriptor::eeprom("group_1", FieldKind::Byte, AddressSpec::row(63, 0, 2)),
        FieldDescriptor::eeprom("group_2", FieldKind::Byte, AddressSpec::row(63, 1, 2)),
        FieldDescriptor::extension("steps", WORD),
    ],
};

/// A group of shutters.
pub static SHUTTER_GROUP_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "ShutterGroupConfiguration",
    records: RecordCount::Fixed(30),
    fields: &[
        FieldDescriptor::eeprom("timer_up", FieldKind::Byte, AddressSpec::row(64, 0, 2)),
        FieldDescriptor::eeprom("timer_down", FieldKind::Byte, AddressSpec::row(64, 1, 2)),
    ],
};

// ============================================================================
// Thermostats and pumps
// ============================================================================

/// Fields of one weekday program: a night temperature and two day periods.
macro_rules! weekday_program {
    ($day:literal, $column:expr, $time_page:expr, $time_offset:expr) => {
        [
            FieldDescriptor::eeprom(
                concat!("auto_", $day, "_temp_n"),
                FieldKind::Temperature,
                AddressSpec::row(198, $column, 1),
            ),
            FieldDescriptor::eeprom(
                concat!("auto_", $day, "_start_d1"),
                FieldKind::Time,
                AddressSpec::row($time_page, $time_offset, 4),
            ),
            FieldDescriptor::eeprom(
                concat!("auto_", $day, "_stop_d1"),
                FieldKind::Time,
                AddressSpec::row($time_page, $time_offset + 1, 4),
            ),
            FieldDescriptor::eeprom(
                concat!("auto_", $day, "_temp_d1"),
                FieldKind::Temperature,
                AddressSpec::row(196, $column, 1),
            ),
            FieldDescriptor::eeprom(
                concat!("auto_", $day, "_start_d2"),
                FieldKind::Time,
                AddressSpec::row($time_page, $time_offset + 2, 4),
            ),
            FieldDescriptor::eeprom(
                concat!("auto_", $day, "_stop_d2"),
                FieldKind::Time,
                AddressSpec::row($time_page, $time_offset + 3, 4),
            ),
            FieldDescriptor::eeprom(
                concat!("auto_", $day, "_temp_d2"),
                FieldKind::Temperature,
                AddressSpec::row(197, $column, 1),
            ),
        ]
    };
}

const THERMOSTAT_BASE: [FieldDescriptor; 16] = [
    FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(187, 16, 0, 16)),
    FieldDescriptor::eeprom("setp0", FieldKind::Temperature, AddressSpec::row(142, 32, 1)),
    FieldDescriptor::eeprom("setp1", FieldKind::Temperature, AddressSpec::row(142, 64, 1)),
    FieldDescriptor::eeprom("setp2", FieldKind::Temperature, AddressSpec::row(142, 96, 1)),
    FieldDescriptor::eeprom("setp3", FieldKind::Temperature, AddressSpec::row(142, 128, 1)),
    FieldDescriptor::eeprom("setp4", FieldKind::Temperature, AddressSpec::row(142, 160, 1)),
    FieldDescriptor::eeprom("setp5", FieldKind::Temperature, AddressSpec::row(142, 192, 1)),
    FieldDescriptor::eeprom("sensor", FieldKind::Byte, AddressSpec::row(144, 8, 1)),
    FieldDescriptor::eeprom("output0", FieldKind::Byte, AddressSpec::row(142, 0, 1)),
    FieldDescriptor::eeprom("output1", FieldKind::Byte, AddressSpec::row(142, 224, 1)),
    FieldDescriptor::eeprom("pid_p", FieldKind::Byte, AddressSpec::row(141, 0, 4)),
    FieldDescriptor::eeprom("pid_i", FieldKind::Byte, AddressSpec::row(141, 1, 4)),
    FieldDescriptor::eeprom("pid_d", FieldKind::Byte, AddressSpec::row(141, 2, 4)),
    FieldDescriptor::eeprom("pid_int", FieldKind::Byte, AddressSpec::row(141, 3, 4)),
    FieldDescriptor::eeprom("permanent_manual", FieldKind::CLASSIC_BOOLEAN, AddressSpec::row(195, 32, 1)),
    FieldDescriptor::extension("room", FieldKind::Byte),
];

const WEEK: [[FieldDescriptor; 7]; 7] = [
    weekday_program!("mon", 0, 189, 0),
    weekday_program!("tue", 32, 189, 128),
    weekday_program!("wed", 64, 190, 0),
    weekday_program!("thu", 96, 190, 128),
    weekday_program!("fri", 128, 191, 0),
    weekday_program!("sat", 160, 191, 128),
    weekday_program!("sun", 192, 192, 0),
];

const fn thermostat_fields() -> [FieldDescriptor; 65] {
    let mut fields = [THERMOSTAT_BASE[0]; 65];
    let mut i = 0;
    while i < THERMOSTAT_BASE.len() {
        fields[i] = THERMOSTAT_BASE[i];
        i += 1;
    }
    let mut day = 0;
    while day < WEEK.len() {
        let mut j = 0;
        while j < 7 {
            fields[THERMOSTAT_BASE.len() + day * 7 + j] = WEEK[day][j];
            j += 1;
        }
        day += 1;
    }
    fields
}

static THERMOSTAT_FIELDS: [FieldDescriptor; 65] = thermostat_fields();

/// One heating thermostat.
pub static THERMOSTAT_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "ThermostatConfiguration",
    records: RecordCount::Fixed(32),
    fields: &THERMOSTAT_FIELDS,
};

/// A pump driven by a set of valve outputs.
pub static PUMP_GROUP_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "PumpGroupConfiguration",
    records: RecordCount::Fixed(8),
    fields: &[
        FieldDescriptor::eeprom("outputs", FieldKind::List { length: 32, unit: 1 }, AddressSpec::row(143, 0, 32)),
        FieldDescriptor::eeprom("output", FieldKind::Byte, AddressSpec::row(144, 0, 1)),
        FieldDescriptor::extension("room", FieldKind::Byte),
    ],
};

/// Thermostat settings shared by every thermostat.
pub static GLOBAL_THERMOSTAT_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "GlobalThermostatConfiguration",
    records: RecordCount::Global,
    fields: &[
        FieldDescriptor::eeprom("outside_sensor", FieldKind::Byte, AddressSpec::fixed(0, 16)),
        FieldDescriptor::eeprom("threshold_temp", FieldKind::Temperature, AddressSpec::fixed(0, 17)),
        FieldDescriptor::eeprom("pump_delay", FieldKind::Byte, AddressSpec::fixed(0, 19)),
    ],
};

// ============================================================================
// Sensors, pulse counters, group and scheduled actions
// ============================================================================

/// One sensor.
pub static SENSOR_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "SensorConfiguration",
    records: RecordCount::Fixed(32),
    fields: &[
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(193, 16, 0, 16)),
        FieldDescriptor::eeprom("virtual", FieldKind::CLASSIC_BOOLEAN, AddressSpec::row(195, 0, 1)),
    ],
};

/// One pulse counter.
pub static PULSE_COUNTER_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "PulseCounterConfiguration",
    records: RecordCount::Fixed(24),
    fields: &[
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(98, 16, 0, 16)),
        FieldDescriptor::eeprom("input", FieldKind::Byte, AddressSpec::row(0, 160, 1)),
    ],
};

/// One group action of up to sixteen basic actions.
pub static GROUP_ACTION_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "GroupActionConfiguration",
    records: RecordCount::Fixed(160),
    fields: &[
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(158, 16, 0, 16)),
        FieldDescriptor::eeprom(
            "actions",
            FieldKind::List { length: 32, unit: 2 },
            AddressSpec::paged(67, 8, 0, 32),
        ),
    ],
};

/// One scheduled action. Hour 24 with minute 0 runs every minute.
pub static SCHEDULED_ACTION_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "ScheduledActionConfiguration",
    records: RecordCount::Fixed(102),
    fields: &[
        FieldDescriptor::eeprom("hour", FieldKind::Byte, AddressSpec::paged(113, 51, 0, 5)),
        FieldDescriptor::eeprom("minute", FieldKind::Byte, AddressSpec::paged(113, 51, 1, 5)),
        FieldDescriptor::eeprom("day", FieldKind::Byte, AddressSpec::paged(113, 51, 2, 5)),
        FieldDescriptor::eeprom(
            "action",
            FieldKind::List { length: 2, unit: 2 },
            AddressSpec::paged(113, 51, 3, 5),
        ),
    ],
};

/// Basic actions run at startup.
pub static STARTUP_ACTION_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "StartupActionConfiguration",
    records: RecordCount::Global,
    fields: &[FieldDescriptor::eeprom(
        "actions",
        FieldKind::List { length: 200, unit: 2 },
        AddressSpec::fixed(1, 0),
    )],
};

// ============================================================================
// Global settings
// ============================================================================

/// Dimmer behaviour.
pub static DIMMER_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "DimmerConfiguration",
    records: RecordCount::Global,
    fields: &[
        FieldDescriptor::eeprom("min_dim_level", FieldKind::Byte, AddressSpec::fixed(0, 5)),
        FieldDescriptor::eeprom("dim_step", FieldKind::Byte, AddressSpec::fixed(0, 6)),
        FieldDescriptor::eeprom("dim_wait_cycle", FieldKind::Byte, AddressSpec::fixed(0, 7)),
        FieldDescriptor::eeprom("dim_memory", FieldKind::Byte, AddressSpec::fixed(0, 9)),
    ],
};

/// Module counts.
pub static MODULE_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "ModuleConfiguration",
    records: RecordCount::Global,
    fields: &[
        FieldDescriptor::eeprom("nr_input_modules", FieldKind::Byte, AddressSpec::fixed(0, 1)).read_only(),
        FieldDescriptor::eeprom("nr_output_modules", FieldKind::Byte, AddressSpec::fixed(0, 2)).read_only(),
        FieldDescriptor::eeprom("enable_thermostat_16", FieldKind::Byte, AddressSpec::fixed(0, 15)),
    ],
};

/// Every classic model.
pub static MODELS: &[&ModelDefinition] = &[
    &OUTPUT_CONFIGURATION,
    &INPUT_CONFIGURATION,
    &SHUTTER_CONFIGURATION,
    &SHUTTER_GROUP_CONFIGURATION,
    &THERMOSTAT_CONFIGURATION,
    &PUMP_GROUP_CONFIGURATION,
    &GLOBAL_THERMOSTAT_CONFIGURATION,
    &SENSOR_CONFIGURATION,
    &PULSE_COUNTER_CONFIGURATION,
    &GROUP_ACTION_CONFIGURATION,
    &SCHEDULED_ACTION_CONFIGURATION,
    &STARTUP_ACTION_CONFIGURATION,
    &DIMMER_CONFIGURATION,
    &MODULE_CONFIGURATION,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{MemoryMap, PageId};

    fn address(model: &ModelDefinition, field: &str, index: u16) -> (PageId, usize) {
        let address = model
            .field(field)
            .expect("field")
            .address(model.name, index, &MemoryMap::CLASSIC)
            .expect("address")
            .expect("memory field");
        (address.page, address.offset)
    }

    #[test]
    fn test_shutter_timers_interleave() {
        assert_eq!(address(&SHUTTER_CONFIGURATION, "timer_up", 5), (PageId::eeprom(34), 179));
        assert_eq!(address(&SHUTTER_CONFIGURATION, "timer_down", 5), (PageId::eeprom(34), 180));
        assert_eq!(address(&SHUTTER_CONFIGURATION, "name", 7), (PageId::eeprom(34), 237));
    }

    #[test]
    fn test_input_names_pack_four_modules() {
        assert_eq!(address(&INPUT_CONFIGURATION, "name", 33), (PageId::eeprom(116), 8));
        assert_eq!(address(&INPUT_CONFIGURATION, "basic_actions", 10), (PageId::eeprom(3), 72));
    }

    #[test]
    fn test_thermostat_week_program() {
        let fields = THERMOSTAT_CONFIGURATION.fields;
        assert_eq!(fields.len(), 65);
        assert_eq!(fields[15].name, "room");
        assert_eq!(fields[16].name, "auto_mon_temp_n");
        assert_eq!(fields[64].name, "auto_sun_temp_d2");
        assert_eq!(address(&THERMOSTAT_CONFIGURATION, "auto_tue_stop_d1", 2), (PageId::eeprom(189), 137));
        assert_eq!(address(&THERMOSTAT_CONFIGURATION, "auto_sun_temp_d2", 3), (PageId::eeprom(197), 195));
    }
}
