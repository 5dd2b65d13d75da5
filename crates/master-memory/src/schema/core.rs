//! Model table of core masters.
//!
//! Module counts live in the first eeprom page. Words are big-endian.

use crate::address::AddressSpec;
use crate::composite::{CompositeDefinition, CompositeMember};
use crate::enums::{EnumDefinition, EnumEntry};
use crate::field::{ByteOrder, FieldKind};
use crate::model::{FieldDescriptor, ModelDefinition, RecordCount};

const WORD: FieldKind = FieldKind::Word(ByteOrder::Big);
const NAME: FieldKind = FieldKind::Text { length: 16 };
const DEVICE_TYPE: FieldKind = FieldKind::Text { length: 1 };

// ============================================================================
// Global configuration
// ============================================================================

static DEBUG: CompositeDefinition = CompositeDefinition {
    name: "Debug",
    width: 8,
    members: &[
        CompositeMember::bit("disable_ba_events", 0),
        CompositeMember::bit("disable_fram_ba_logging", 1),
        CompositeMember::bit("enable_fram_error_logging", 2),
        CompositeMember::bit("enable_health_check", 3),
    ],
};

/// Module counts, bus timings and global group actions.
pub static GLOBAL_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "GlobalConfiguration",
    records: RecordCount::Global,
    fields: &[
        FieldDescriptor::eeprom("hardware_detection", FieldKind::Byte, AddressSpec::fixed(0, 0)),
        FieldDescriptor::eeprom("number_of_output_modules", FieldKind::Byte, AddressSpec::fixed(0, 1)),
        FieldDescriptor::eeprom("number_of_input_modules", FieldKind::Byte, AddressSpec::fixed(0, 2)),
        FieldDescriptor::eeprom("number_of_sensor_modules", FieldKind::Byte, AddressSpec::fixed(0, 3)),
        FieldDescriptor::eeprom("scan_time_rs485_sensor_modules", FieldKind::Byte, AddressSpec::fixed(0, 4)),
        FieldDescriptor::eeprom("number_of_can_inputs", FieldKind::Byte, AddressSpec::fixed(0, 5)),
        FieldDescriptor::eeprom("number_of_can_sensors", FieldKind::Byte, AddressSpec::fixed(0, 6)),
        FieldDescriptor::eeprom("number_of_ucan_modules", FieldKind::Byte, AddressSpec::fixed(0, 7)),
        FieldDescriptor::eeprom("scan_time_rs485_bus", FieldKind::Byte, AddressSpec::fixed(0, 8)),
        FieldDescriptor::eeprom("number_of_can_control_modules", FieldKind::Byte, AddressSpec::fixed(0, 9)),
        FieldDescriptor::eeprom(
            "scan_time_rs485_can_control_modules",
            FieldKind::Byte,
            AddressSpec::fixed(0, 10),
        ),
        FieldDescriptor::eeprom("automatic_module_discovery", FieldKind::CORE_BOOLEAN, AddressSpec::fixed(0, 11)),
        FieldDescriptor::eeprom("can_bus_termination", FieldKind::CORE_BOOLEAN, AddressSpec::fixed(0, 12)),
        FieldDescriptor::eeprom("debug", FieldKind::Composite(&DEBUG), AddressSpec::fixed(0, 13)),
        FieldDescriptor::eeprom("groupaction_all_outputs_off", WORD, AddressSpec::fixed(0, 50)),
        FieldDescriptor::eeprom("groupaction_startup", WORD, AddressSpec::fixed(0, 52)),
        FieldDescriptor::eeprom("groupaction_minutes_changed", WORD, AddressSpec::fixed(0, 54)),
        FieldDescriptor::eeprom("groupaction_hours_changed", WORD, AddressSpec::fixed(0, 56)),
        FieldDescriptor::eeprom("groupaction_day_changed", WORD, AddressSpec::fixed(0, 58)),
        FieldDescriptor::eeprom("groupaction_any_output_changed", WORD, AddressSpec::fixed(0, 60)),
        FieldDescriptor::fram("startup_time", FieldKind::Bytes { length: 3 }, AddressSpec::fixed(0, 64)).read_only(),
        FieldDescriptor::fram("startup_date", FieldKind::Bytes { length: 3 }, AddressSpec::fixed(0, 67)).read_only(),
        FieldDescriptor::fram("uptime_hours", FieldKind::Word3, AddressSpec::fixed(0, 70)).read_only(),
    ],
};

// ============================================================================
// Outputs
// ============================================================================

static SHUTTER_MODE: CompositeDefinition = CompositeDefinition {
    name: "ShutterMode",
    width: 8,
    members: &[
        CompositeMember::bit("set_01_direction", 0),
        CompositeMember::bit("set_23_direction", 1),
        CompositeMember::bit("set_45_direction", 2),
        CompositeMember::bit("set_67_direction", 3),
        CompositeMember::bit("are_01_outputs", 4),
        CompositeMember::bit("are_23_outputs", 5),
        CompositeMember::bit("are_45_outputs", 6),
        CompositeMember::bit("are_67_outputs", 7),
    ],
};

/// One output module, eight outputs.
pub static OUTPUT_MODULE_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "OutputModuleConfiguration",
    records: RecordCount::per_module(0, 1, 1, 80),
    fields: &[
        FieldDescriptor::eeprom("device_type", DEVICE_TYPE, AddressSpec::paged(1, 1, 0, 0))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom("address", FieldKind::Address { length: 4 }, AddressSpec::paged(1, 1, 0, 0))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom("firmware_version", FieldKind::Version, AddressSpec::paged(1, 1, 4, 0)).read_only(),
        FieldDescriptor::eeprom("shutter_config", FieldKind::Composite(&SHUTTER_MODE), AddressSpec::row(392, 0, 1)),
    ],
};

static TIMER_TYPE: EnumDefinition = EnumDefinition {
    name: "TimerType",
    entries: &[
        EnumEntry::new("INACTIVE", &[0, 255]),
        EnumEntry::new("PER_100_MS", &[1]),
        EnumEntry::new("PER_1_S", &[2]),
        EnumEntry::new("ABSOLUTE", &[3]),
    ],
};

static DALI_OUTPUT: CompositeDefinition = CompositeDefinition {
    name: "DaliOutput",
    width: 8,
    members: &[CompositeMember::number("dali_output_id", 0, 8).with_max(63)],
};

static OUTPUT_STATUS: CompositeDefinition = CompositeDefinition {
    name: "OutputStatus",
    width: 8,
    members: &[CompositeMember::record_bit("on", output_bit)],
};

static OUTPUT_LOCKING: CompositeDefinition = CompositeDefinition {
    name: "OutputLocking",
    width: 8,
    members: &[CompositeMember::record_bit("locked", output_bit)],
};

fn output_bit(id: u16) -> u8 {
    (id % 8) as u8
}

fn output_status(id: u16) -> (u16, u16) {
    (id / 64 + 1, (id / 8 * 32) & 0xFF)
}

fn output_locking(id: u16) -> (u16, u16) {
    let (page, offset) = output_status(id);
    (page, offset + 9)
}

/// One output.
pub static OUTPUT_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "OutputConfiguration",
    records: RecordCount::per_module(0, 1, 8, 640),
    fields: &[
        FieldDescriptor::eeprom("timer_value", WORD, AddressSpec::paged(1, 8, 7, 2)),
        FieldDescriptor::eeprom("timer_type", FieldKind::Enum(&TIMER_TYPE), AddressSpec::paged(1, 8, 23, 1)),
        FieldDescriptor::eeprom("output_type", FieldKind::Byte, AddressSpec::paged(1, 8, 31, 1)),
        FieldDescriptor::eeprom("min_output_level", FieldKind::Byte, AddressSpec::paged(1, 8, 39, 1)),
        FieldDescriptor::eeprom("max_output_level", FieldKind::Byte, AddressSpec::paged(1, 8, 47, 1)),
        FieldDescriptor::eeprom("output_groupaction_follow", WORD, AddressSpec::paged(1, 8, 55, 2)),
        FieldDescriptor::eeprom("dali_mapping", FieldKind::Composite(&DALI_OUTPUT), AddressSpec::paged(1, 8, 71, 1)),
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(1, 8, 128, 16)),
        FieldDescriptor::fram(
            "status",
            FieldKind::Composite(&OUTPUT_STATUS),
            AddressSpec::Computed(output_status),
        ),
        FieldDescriptor::fram(
            "locking",
            FieldKind::Composite(&OUTPUT_LOCKING),
            AddressSpec::Computed(output_locking),
        ),
    ],
};

// ============================================================================
// Inputs
// ============================================================================

/// One input module. Every module takes two pages.
pub static INPUT_MODULE_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "InputModuleConfiguration",
    records: RecordCount::per_module(0, 2, 1, 79),
    fields: &[
        FieldDescriptor::eeprom("device_type", DEVICE_TYPE, AddressSpec::paged(81, 1, 0, 0).with_page_stride(2))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom(
            "address",
            FieldKind::Address { length: 4 },
            AddressSpec::paged(81, 1, 0, 0).with_page_stride(2),
        )
        .read_only()
        .shared(),
        FieldDescriptor::eeprom(
            "firmware_version",
            FieldKind::Version,
            AddressSpec::paged(81, 1, 4, 0).with_page_stride(2),
        )
        .read_only(),
    ],
};

static INPUT_CONFIG: CompositeDefinition = CompositeDefinition {
    name: "InputConfig",
    width: 8,
    members: &[CompositeMember::bit("normal_open", 0)],
};

static DALI_INPUT: CompositeDefinition = CompositeDefinition {
    name: "DaliInput",
    width: 8,
    members: &[CompositeMember::number("lunatone_input_id", 0, 8).with_max(63)],
};

static INPUT_LINK: CompositeDefinition = CompositeDefinition {
    name: "InputLink",
    width: 16,
    members: &[
        CompositeMember::number("output_id", 0, 10),
        CompositeMember::bit("enable_press_and_release", 10),
        CompositeMember::bit("dimming_up", 11),
        CompositeMember::bit("enable_1s_press", 12),
        CompositeMember::bit("enable_2s_press", 13),
        CompositeMember::bit("not_used", 14),
        CompositeMember::bit("enable_double_press", 15),
    ],
};

const fn input(page: u16, offset: u16, stride: u16) -> AddressSpec {
    AddressSpec::paged(page, 8, offset, stride).with_page_stride(2)
}

/// One input.
pub static INPUT_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "InputConfiguration",
    records: RecordCount::per_module(0, 2, 8, 632),
    fields: &[
        FieldDescriptor::eeprom("input_config", FieldKind::Composite(&INPUT_CONFIG), input(81, 7, 1)),
        FieldDescriptor::eeprom("dali_mapping", FieldKind::Composite(&DALI_INPUT), input(81, 15, 1)),
        FieldDescriptor::eeprom("basic_action_1s_press", FieldKind::BasicAction, input(81, 32, 6)),
        FieldDescriptor::eeprom("pulse_counter_id", FieldKind::Byte, input(81, 120, 1)),
        FieldDescriptor::eeprom("name", NAME, input(81, 128, 16)),
        FieldDescriptor::eeprom("input_link", FieldKind::Composite(&INPUT_LINK), input(82, 0, 2)),
        FieldDescriptor::eeprom("basic_action_press", FieldKind::BasicAction, input(82, 16, 6)),
        FieldDescriptor::eeprom("basic_action_release", FieldKind::BasicAction, input(82, 64, 6)),
        FieldDescriptor::eeprom("basic_action_2s_press", FieldKind::BasicAction, input(82, 160, 6)),
        FieldDescriptor::eeprom("basic_action_double_press", FieldKind::BasicAction, input(82, 208, 6)),
    ],
};

// ============================================================================
// Sensors
// ============================================================================

/// One sensor module.
pub static SENSOR_MODULE_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "SensorModuleConfiguration",
    records: RecordCount::per_module(0, 3, 1, 16),
    fields: &[
        FieldDescriptor::eeprom("device_type", DEVICE_TYPE, AddressSpec::paged(239, 1, 0, 0))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom("address", FieldKind::Address { length: 4 }, AddressSpec::paged(239, 1, 0, 0))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom("firmware_version", FieldKind::Version, AddressSpec::paged(239, 1, 4, 0)).read_only(),
    ],
};

/// One sensor.
pub static SENSOR_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "SensorConfiguration",
    records: RecordCount::per_module(0, 3, 8, 128),
    fields: &[
        FieldDescriptor::eeprom("temperature_groupaction_follow", WORD, AddressSpec::paged(239, 8, 8, 2)),
        FieldDescriptor::eeprom("humidity_groupaction_follow", WORD, AddressSpec::paged(239, 8, 24, 2)),
        FieldDescriptor::eeprom("brightness_groupaction_follow", WORD, AddressSpec::paged(239, 8, 40, 2)),
        FieldDescriptor::eeprom("aqi_groupaction_follow", WORD, AddressSpec::paged(239, 8, 56, 2)),
        FieldDescriptor::eeprom("dali_mapping", FieldKind::Composite(&DALI_OUTPUT), AddressSpec::paged(239, 8, 72, 1)),
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(239, 8, 128, 16)),
        FieldDescriptor::fram("temperature_offset", FieldKind::Temperature, AddressSpec::row(51, 0, 2)),
    ],
};

/// Extra sensors fed by the gateway.
pub static EXTRA_SENSOR_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "ExtraSensorConfiguration",
    records: RecordCount::Fixed(64),
    fields: &[
        FieldDescriptor::eeprom("groupaction_changed", WORD, AddressSpec::row(471, 0, 2)),
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(472, 16, 0, 16)),
    ],
};

// ============================================================================
// Shutters
// ============================================================================

static SHUTTER_OUTPUTS: CompositeDefinition = CompositeDefinition {
    name: "ShutterOutputs",
    width: 8,
    members: &[CompositeMember::number("output_0", 0, 8).with_factor(2)],
};

static SHUTTER_GROUPS: CompositeDefinition = CompositeDefinition {
    name: "ShutterGroups",
    width: 16,
    members: &[
        CompositeMember::inverted_bit("group_0", 0),
        CompositeMember::inverted_bit("group_1", 1),
        CompositeMember::inverted_bit("group_2", 2),
        CompositeMember::inverted_bit("group_3", 3),
        CompositeMember::inverted_bit("group_4", 4),
        CompositeMember::inverted_bit("group_5", 5),
        CompositeMember::inverted_bit("group_6", 6),
        CompositeMember::inverted_bit("group_7", 7),
        CompositeMember::inverted_bit("group_8", 8),
        CompositeMember::inverted_bit("group_9", 9),
        CompositeMember::inverted_bit("group_10", 10),
        CompositeMember::inverted_bit("group_11", 11),
        CompositeMember::inverted_bit("group_12", 12),
        CompositeMember::inverted_bit("group_13", 13),
        CompositeMember::inverted_bit("group_14", 14),
        CompositeMember::inverted_bit("group_15", 15),
    ],
};

/// One shutter, four per output module.
pub static SHUTTER_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "ShutterConfiguration",
    records: RecordCount::per_module(0, 1, 4, 256),
    fields: &[
        FieldDescriptor::eeprom("outputs", FieldKind::Composite(&SHUTTER_OUTPUTS), AddressSpec::row(391, 0, 1)),
        FieldDescriptor::eeprom("timer_up", WORD, AddressSpec::paged(393, 128, 0, 2)),
        FieldDescriptor::eeprom("timer_down", WORD, AddressSpec::paged(395, 128, 0, 2)),
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(397, 16, 0, 16)),
        FieldDescriptor::eeprom("groups", FieldKind::Composite(&SHUTTER_GROUPS), AddressSpec::paged(413, 128, 0, 2)),
    ],
};

// ============================================================================
// Group actions and validation bits
// ============================================================================

/// Range of basic actions a group action runs.
pub static GROUP_ACTION_ADDRESS_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "GroupActionAddressConfiguration",
    records: RecordCount::Fixed(256),
    fields: &[
        FieldDescriptor::eeprom("start", WORD, AddressSpec::paged(256, 64, 0, 4)),
        FieldDescriptor::eeprom("end", WORD, AddressSpec::paged(256, 64, 2, 4)),
    ],
};

/// One group action.
pub static GROUP_ACTION_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "GroupActionConfiguration",
    records: RecordCount::Fixed(256),
    fields: &[FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(261, 16, 0, 16))],
};

// 42 actions per page, with a two byte gap after the first 21.
fn group_action_basic_action(id: u16) -> (u16, u16) {
    let slot = id % 42;
    (281 + id / 42, slot * 6 + if slot < 21 { 0 } else { 2 })
}

/// The shared pool of group action basic actions.
pub static GROUP_ACTION_BASIC_ACTION: ModelDefinition = ModelDefinition {
    name: "GroupActionBasicAction",
    records: RecordCount::Fixed(4200),
    fields: &[FieldDescriptor::eeprom(
        "basic_action",
        FieldKind::BasicAction,
        AddressSpec::Computed(group_action_basic_action),
    )],
};

/// One validation bit.
pub static VALIDATION_BIT_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "ValidationBitConfiguration",
    records: RecordCount::Fixed(256),
    fields: &[
        FieldDescriptor::eeprom("groupaction_changed", WORD, AddressSpec::paged(480, 128, 0, 2)),
        FieldDescriptor::eeprom("name", NAME, AddressSpec::paged(482, 16, 0, 16)),
    ],
};

// ============================================================================
// CAN and uCAN
// ============================================================================

/// One CAN control module.
pub static CAN_CONTROL_MODULE_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "CanControlModuleConfiguration",
    records: RecordCount::per_module(0, 9, 1, 16),
    fields: &[
        FieldDescriptor::eeprom("device_type", DEVICE_TYPE, AddressSpec::row(255, 0, 16))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom("address", FieldKind::Address { length: 4 }, AddressSpec::row(255, 0, 16))
            .read_only()
            .shared(),
    ],
};

static MODBUS_SPEED: EnumDefinition = EnumDefinition {
    name: "ModbusSpeed",
    entries: &[
        EnumEntry::new("B4800", &[0, 255]),
        EnumEntry::new("B9600", &[1]),
        EnumEntry::new("B19200", &[2]),
        EnumEntry::new("B38400", &[3]),
        EnumEntry::new("B57600", &[4]),
        EnumEntry::new("B115200", &[5]),
    ],
};

static MODBUS_MODEL: EnumDefinition = EnumDefinition {
    name: "ModbusModel",
    entries: &[
        EnumEntry::new("OPENMOTICS_COLOR_THERMOSTAT", &[0, 255]),
        EnumEntry::new("HEATMISER_THERMOSTAT", &[1]),
    ],
};

static MODBUS_TYPE: CompositeDefinition = CompositeDefinition {
    name: "ModbusType",
    width: 8,
    members: &[
        CompositeMember::bit("ucan_voc", 7),
        CompositeMember::bit("ucan_co2", 6),
        CompositeMember::bit("ucan_hum", 5),
        CompositeMember::bit("ucan_temp", 4),
        CompositeMember::bit("ucan_lux", 3),
        CompositeMember::bit("ucan_sound", 2),
    ],
};

const fn ucan(offset: u16) -> AddressSpec {
    AddressSpec::paged(383, 16, offset, 16)
}

/// One uCAN module.
pub static UCAN_MODULE_CONFIGURATION: ModelDefinition = ModelDefinition {
    name: "UCanModuleConfiguration",
    records: RecordCount::per_module(0, 7, 1, 128),
    fields: &[
        FieldDescriptor::eeprom("device_type", DEVICE_TYPE, ucan(0)).read_only().shared(),
        FieldDescriptor::eeprom("address", FieldKind::Address { length: 3 }, ucan(0))
            .read_only()
            .shared(),
        FieldDescriptor::eeprom("module_id", FieldKind::Byte, ucan(3)),
        FieldDescriptor::eeprom("modbus_address", FieldKind::Byte, ucan(12)),
        FieldDescriptor::eeprom("modbus_type", FieldKind::Composite(&MODBUS_TYPE), ucan(13)),
        FieldDescriptor::eeprom("modbus_model", FieldKind::Enum(&MODBUS_MODEL), ucan(14)),
        FieldDescriptor::eeprom("modbus_speed", FieldKind::Enum(&MODBUS_SPEED), ucan(15)),
    ],
};

/// Every core model.
pub static MODELS: &[&ModelDefinition] = &[
    &GLOBAL_CONFIGURATION,
    &OUTPUT_MODULE_CONFIGURATION,
    &OUTPUT_CONFIGURATION,
    &INPUT_MODULE_CONFIGURATION,
    &INPUT_CONFIGURATION,
    &SENSOR_MODULE_CONFIGURATION,
    &SENSOR_CONFIGURATION,
    &EXTRA_SENSOR_CONFIGURATION,
    &SHUTTER_CONFIGURATION,
    &GROUP_ACTION_ADDRESS_CONFIGURATION,
    &GROUP_ACTION_CONFIGURATION,
    &GROUP_ACTION_BASIC_ACTION,
    &VALIDATION_BIT_CONFIGURATION,
    &CAN_CONTROL_MODULE_CONFIGURATION,
    &UCAN_MODULE_CONFIGURATION,
];
