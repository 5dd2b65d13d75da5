//! Shipped model tables, one per hardware family.

pub mod classic;
pub mod core;

use master_protocol::HardwareFamily;

use crate::model::ModelDefinition;

/// Model table of a family.
pub fn models(family: HardwareFamily) -> &'static [&'static ModelDefinition] {
    match family {
        HardwareFamily::Classic => classic::MODELS,
        HardwareFamily::Core => self::core::MODELS,
    }
}

/// Model of a family by name.
pub fn find(family: HardwareFamily, name: &str) -> Option<&'static ModelDefinition> {
    models(family).iter().copied().find(|m| m.name == name)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::address::MemoryMap;

    fn check(family: HardwareFamily, map: &MemoryMap) {
        let mut names = HashSet::new();
        for model in models(family) {
            assert!(names.insert(model.name), "duplicate model {}", model.name);
            if let Err(e) = model.validate(map) {
                panic!("{} {}: {}", family.as_str(), model.name, e);
            }
        }
    }

    #[test]
    fn test_classic_tables_validate() {
        check(HardwareFamily::Classic, &MemoryMap::CLASSIC);
    }

    #[test]
    fn test_core_tables_validate() {
        check(HardwareFamily::Core, &MemoryMap::CORE);
    }

    #[test]
    fn test_find_by_family() {
        assert!(find(HardwareFamily::Core, "UCanModuleConfiguration").is_some());
        assert!(find(HardwareFamily::Classic, "UCanModuleConfiguration").is_none());
        let shutter = find(HardwareFamily::Classic, "ShutterConfiguration").expect("shutter");
        assert!(shutter.has_extensions());
        assert!(!find(HardwareFamily::Core, "ShutterConfiguration").expect("shutter").has_extensions());
    }
}
