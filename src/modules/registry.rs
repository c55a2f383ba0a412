//! Module registry: name-keyed directory of kernel modules with lifecycle status.
//!
//! The registry is constructed explicitly per kernel instance and populated
//! during bootstrap, typically through [`ModuleRegistry::builder`]. All
//! mutations are synchronous and report success through their return value;
//! an unknown name is logged and answered with `false`/`None`, never a panic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ModuleError;

// ---------------------------------------------------------------------------
// KernelModule
// ---------------------------------------------------------------------------

/// A component that can be registered with the kernel.
pub trait KernelModule: Send + Sync {
    /// Stop hook invoked by [`ModuleRegistry::stop_all`]. Defaults to a no-op.
    fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// State captured into kernel snapshots. Defaults to `null`.
    fn capture_state(&self) -> Value {
        Value::Null
    }
}

// ---------------------------------------------------------------------------
// Types / status
// ---------------------------------------------------------------------------

/// Module category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Structure,
    Feature,
    Interpretation,
    Validation,
    Rendering,
}

/// Module lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Registered,
    Initialized,
    Running,
    Paused,
    Disabled,
    Error,
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleType::Structure => "structure",
            ModuleType::Feature => "feature",
            ModuleType::Interpretation => "interpretation",
            ModuleType::Validation => "validation",
            ModuleType::Rendering => "rendering",
        };
        f.write_str(s)
    }
}

/// Registry entry.
#[derive(Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub module_type: ModuleType,
    pub instance: Arc<dyn KernelModule>,
    /// Higher is more important.
    pub priority: i32,
    pub description: String,
    pub status: ModuleStatus,
}

impl ModuleInfo {
    pub fn new(
        name: impl Into<String>,
        module_type: ModuleType,
        instance: Arc<dyn KernelModule>,
    ) -> Self {
        Self {
            name: name.into(),
            module_type,
            instance,
            priority: 0,
            description: String::new(),
            status: ModuleStatus::Registered,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Serializable view without the instance handle.
    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            name: self.name.clone(),
            module_type: self.module_type,
            status: self.status,
            priority: self.priority,
            description: self.description.clone(),
        }
    }
}

impl fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInfo")
            .field("name", &self.name)
            .field("module_type", &self.module_type)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .finish()
    }
}

/// What `list_modules` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub status: ModuleStatus,
    pub priority: i32,
    pub description: String,
}

/// Outcome of a [`ModuleRegistry::stop_all`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub stopped: usize,
    pub failed: usize,
}

/// Status counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub running: usize,
    pub disabled: usize,
    pub paused: usize,
    pub error: usize,
}

// ---------------------------------------------------------------------------
// ModuleRegistry
// ---------------------------------------------------------------------------

/// Name-keyed module directory. Iteration follows registration order.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, ModuleInfo>,
    order: Vec<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::default()
    }

    /// Register a module. A second registration under the same name is a
    /// no-op and returns `false`.
    pub fn register(&mut self, info: ModuleInfo) -> bool {
        if self.modules.contains_key(&info.name) {
            log::warn!("[ModuleRegistry] Module already registered: {}", info.name);
            return false;
        }
        log::info!(
            "[ModuleRegistry] Module registered: {} (type={}, priority={})",
            info.name,
            info.module_type,
            info.priority
        );
        self.order.push(info.name.clone());
        self.modules.insert(info.name.clone(), info);
        true
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        if self.modules.remove(name).is_none() {
            log::warn!("[ModuleRegistry] Module not found: {}", name);
            return false;
        }
        self.order.retain(|n| n != name);
        log::info!("[ModuleRegistry] Module unregistered: {}", name);
        true
    }

    /// Instance handle of a module.
    pub fn get(&self, name: &str) -> Option<Arc<dyn KernelModule>> {
        self.modules.get(name).map(|m| m.instance.clone())
    }

    pub fn get_info(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.get(name)
    }

    /// Like [`get_info`](Self::get_info) but with a typed error.
    pub fn require(&self, name: &str) -> Result<&ModuleInfo, ModuleError> {
        self.modules
            .get(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))
    }

    pub fn enable(&mut self, name: &str) -> bool {
        self.set_status(name, ModuleStatus::Running, "enabled")
    }

    pub fn disable(&mut self, name: &str) -> bool {
        self.set_status(name, ModuleStatus::Disabled, "disabled")
    }

    fn set_status(&mut self, name: &str, status: ModuleStatus, verb: &str) -> bool {
        match self.modules.get_mut(name) {
            Some(info) => {
                info.status = status;
                log::info!("[ModuleRegistry] Module {}: {}", verb, name);
                true
            }
            None => {
                log::warn!("[ModuleRegistry] Module not found: {}", name);
                false
            }
        }
    }

    /// Disable every module whose name is not in `keep`. Returns how many
    /// modules were disabled.
    pub fn disable_all_except(&mut self, keep: &[&str]) -> usize {
        let mut count = 0;
        for info in self.modules.values_mut() {
            if !keep.contains(&info.name.as_str()) {
                info.status = ModuleStatus::Disabled;
                count += 1;
            }
        }
        log::info!(
            "[ModuleRegistry] All modules disabled except: {:?} (disabled {} modules)",
            keep,
            count
        );
        count
    }

    /// Put every module in read-only (paused) mode.
    pub fn set_all_read_only(&mut self) -> usize {
        for info in self.modules.values_mut() {
            info.status = ModuleStatus::Paused;
        }
        let count = self.modules.len();
        log::info!("[ModuleRegistry] All modules set to read-only mode ({} modules)", count);
        count
    }

    /// Invoke every module's stop hook, in registration order.
    ///
    /// A failing hook marks that module `Error` and the sweep continues.
    pub fn stop_all(&mut self) -> StopReport {
        let mut report = StopReport::default();
        for name in &self.order {
            let Some(info) = self.modules.get_mut(name) else {
                continue;
            };
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                info.instance.stop()
            }));
            match outcome {
                Ok(Ok(())) => {
                    info.status = ModuleStatus::Paused;
                    report.stopped += 1;
                }
                Ok(Err(e)) => {
                    log::error!("[ModuleRegistry] Error stopping module {}: {}", name, e);
                    info.status = ModuleStatus::Error;
                    report.failed += 1;
                }
                Err(_) => {
                    log::error!("[ModuleRegistry] Module {} panicked while stopping", name);
                    info.status = ModuleStatus::Error;
                    report.failed += 1;
                }
            }
        }
        if report.failed > 0 {
            log::info!(
                "[ModuleRegistry] Stopped {} modules ({} errors)",
                report.stopped,
                report.failed
            );
        } else {
            log::info!("[ModuleRegistry] Stopped {} modules", report.stopped);
        }
        report
    }

    fn iter(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.order.iter().filter_map(|n| self.modules.get(n))
    }

    pub fn list_modules(&self) -> Vec<ModuleSummary> {
        self.iter().map(ModuleInfo::summary).collect()
    }

    pub fn by_type(&self, module_type: ModuleType) -> Vec<&ModuleInfo> {
        self.iter().filter(|m| m.module_type == module_type).collect()
    }

    pub fn by_status(&self, status: ModuleStatus) -> Vec<&ModuleInfo> {
        self.iter().filter(|m| m.status == status).collect()
    }

    /// Running modules, optionally sorted by descending priority (stable).
    pub fn get_enabled_modules(&self, sort_by_priority: bool) -> Vec<&ModuleInfo> {
        let mut enabled = self.by_status(ModuleStatus::Running);
        if sort_by_priority {
            enabled.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        enabled
    }

    pub fn get_stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.modules.len(),
            ..RegistryStats::default()
        };
        for info in self.modules.values() {
            match info.status {
                ModuleStatus::Running => stats.running += 1,
                ModuleStatus::Disabled => stats.disabled += 1,
                ModuleStatus::Paused => stats.paused += 1,
                ModuleStatus::Error => stats.error += 1,
                ModuleStatus::Registered | ModuleStatus::Initialized => {}
            }
        }
        stats
    }

    /// Snapshot of every module's captured state, keyed by name.
    pub fn capture_states(&self) -> serde_json::Map<String, Value> {
        self.iter()
            .map(|m| (m.name.clone(), m.instance.capture_state()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Explicit bootstrap-time registration.
#[derive(Default)]
pub struct ModuleRegistryBuilder {
    entries: Vec<ModuleInfo>,
    start_enabled: bool,
}

impl ModuleRegistryBuilder {
    pub fn module(mut self, info: ModuleInfo) -> Self {
        self.entries.push(info);
        self
    }

    /// Mark every module `Running` once registered.
    pub fn enabled(mut self) -> Self {
        self.start_enabled = true;
        self
    }

    pub fn build(self) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        for info in self.entries {
            let name = info.name.clone();
            if registry.register(info) && self.start_enabled {
                registry.enable(&name);
            }
        }
        registry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;
    impl KernelModule for Quiet {}

    struct Broken;
    impl KernelModule for Broken {
        fn stop(&self) -> Result<(), ModuleError> {
            Err(ModuleError::Runtime("disk full".into()))
        }
    }

    struct Stateful;
    impl KernelModule for Stateful {
        fn capture_state(&self) -> Value {
            serde_json::json!({ "ticks": 3 })
        }
    }

    fn info(name: &str, ty: ModuleType, priority: i32) -> ModuleInfo {
        ModuleInfo::new(name, ty, Arc::new(Quiet)).with_priority(priority)
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let mut reg = ModuleRegistry::new();
        assert!(reg.register(info("a", ModuleType::Feature, 1).with_description("first")));
        assert!(!reg.register(info("a", ModuleType::Rendering, 9).with_description("second")));
        assert_eq!(reg.len(), 1);
        let kept = reg.get_info("a").unwrap();
        assert_eq!(kept.module_type, ModuleType::Feature);
        assert_eq!(kept.description, "first");
    }

    #[test]
    fn test_unknown_names_report_not_found() {
        let mut reg = ModuleRegistry::new();
        assert!(!reg.enable("ghost"));
        assert!(!reg.disable("ghost"));
        assert!(!reg.unregister("ghost"));
        assert!(reg.get("ghost").is_none());
        assert!(matches!(reg.require("ghost"), Err(ModuleError::NotFound(_))));
    }

    #[test]
    fn test_enabled_modules_sorted_by_priority() {
        let mut reg = ModuleRegistry::builder()
            .module(info("low", ModuleType::Feature, 1))
            .module(info("high", ModuleType::Validation, 10))
            .module(info("mid", ModuleType::Feature, 5))
            .enabled()
            .build();
        reg.disable("mid");

        let names: Vec<&str> = reg
            .get_enabled_modules(true)
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["high", "low"]);

        let unsorted: Vec<&str> = reg
            .get_enabled_modules(false)
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(unsorted, vec!["low", "high"]);
        assert_eq!(reg.by_type(ModuleType::Feature).len(), 2);
    }

    #[test]
    fn test_disable_all_except_and_read_only() {
        let mut reg = ModuleRegistry::builder()
            .module(info("a", ModuleType::Structure, 0))
            .module(info("b", ModuleType::Structure, 0))
            .module(info("c", ModuleType::Structure, 0))
            .enabled()
            .build();

        assert_eq!(reg.disable_all_except(&["b"]), 2);
        assert_eq!(reg.by_status(ModuleStatus::Running).len(), 1);
        assert_eq!(reg.get_stats().disabled, 2);

        assert_eq!(reg.set_all_read_only(), 3);
        assert_eq!(reg.get_stats().paused, 3);
    }

    #[test]
    fn test_stop_all_tolerates_failures() {
        let mut reg = ModuleRegistry::new();
        reg.register(info("ok1", ModuleType::Feature, 0));
        reg.register(ModuleInfo::new("broken", ModuleType::Feature, Arc::new(Broken)));
        reg.register(info("ok2", ModuleType::Feature, 0));

        let report = reg.stop_all();
        assert_eq!(report, StopReport { stopped: 2, failed: 1 });
        assert_eq!(reg.get_info("broken").unwrap().status, ModuleStatus::Error);
        assert_eq!(reg.get_info("ok2").unwrap().status, ModuleStatus::Paused);

        let stats = reg.get_stats();
        assert_eq!(stats.error, 1);
        assert_eq!(stats.paused, 2);
    }

    #[test]
    fn test_list_and_capture_states_follow_registration_order() {
        let mut reg = ModuleRegistry::new();
        reg.register(ModuleInfo::new("z", ModuleType::Feature, Arc::new(Stateful)));
        reg.register(info("a", ModuleType::Feature, 0));

        let names: Vec<String> = reg.list_modules().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["z", "a"]);

        let states = reg.capture_states();
        assert_eq!(states["z"]["ticks"], 3);
        assert!(states["a"].is_null());

        assert!(reg.unregister("z"));
        assert!(!reg.contains("z"));
        assert_eq!(reg.list_modules().len(), 1);
    }
}
