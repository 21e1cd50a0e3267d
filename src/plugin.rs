//! Per-flow plugin dispatch (spec §4.7).
//!
//! Modeled as a trait with every method defaulted to a no-op, the same
//! shape the teacher's own config surface favors (most `NetflowParserBuilder`
//! fields are optional and independently defaulted): a plugin implements
//! only the hooks it needs. Flows own their plugin state directly
//! (`FlowRecord::plugin_data`) and plugins receive the record by reference
//! at call time rather than holding a pointer back into it, which is what
//! spec §9's design note about avoiding a flow/plugin reference cycle comes
//! down to in Rust: there is no cycle to build in the first place.

use std::any::Any;

use crate::error::ConfigError;
use crate::flow::FlowRecord;
use crate::wire::variable_versions::data_number::FieldValue;

pub type PluginId = u16;

/// Opaque per-flow state owned by a plugin, attached to a [`FlowRecord`].
pub struct PluginData {
    pub plugin_id: PluginId,
    pub data: Box<dyn Any + Send>,
}

/// A field a plugin contributes to the export template.
#[derive(Debug, Clone)]
pub struct PluginField {
    pub name: &'static str,
    /// Field id in the plugin's own enterprise number space; must not
    /// collide with another plugin's field id under the same enterprise
    /// number (checked at registry build time).
    pub field_id: u16,
    pub enterprise_number: u32,
}

/// The capability set a flow plugin may implement. Every method defaults to
/// a no-op / `None`, so a plugin that only cares about, say, HTTP host
/// extraction implements `on_packet` and `serialize_field` and nothing else.
pub trait FlowPlugin: Send + Sync {
    /// Stable name, used in logs and in `--help`-style external listings.
    fn name(&self) -> &'static str;

    /// Fields this plugin can contribute to a template, if referenced by
    /// name in the configured template macro string.
    fn describe_fields(&self) -> Vec<PluginField> {
        Vec::new()
    }

    /// Called once when a flow record is first created.
    fn on_create(&self, _flow: &FlowRecord) -> Option<Box<dyn Any + Send>> {
        None
    }

    /// Called on every packet folded into an existing flow, after the core
    /// counters have been updated.
    fn on_packet(&self, _flow: &FlowRecord, _data: &mut Box<dyn Any + Send>, _payload: &[u8]) {}

    /// Called once when a flow is about to leave the export queue, giving
    /// the plugin a chance to tear down any resources in `data`.
    fn on_delete(&self, _flow: &FlowRecord, _data: &Box<dyn Any + Send>) {}

    /// Produce the wire value for one of this plugin's fields during
    /// export. `None` means "omit the field for this record".
    fn serialize_field(
        &self,
        _field_id: u16,
        _flow: &FlowRecord,
        _data: Option<&Box<dyn Any + Send>>,
    ) -> Option<FieldValue> {
        None
    }

    /// Human-readable rendering of a field value, for text dump sinks
    /// (an external collaborator; this hook just supplies the formatting).
    fn format_field(&self, _field_id: u16, value: &FieldValue) -> String {
        format!("{value:?}")
    }
}

/// The set of plugins active for one run, keyed by the order they were
/// registered (that order is the `PluginId`).
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn FlowPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, rejecting it if any field it describes collides
    /// with a field already claimed by an earlier plugin under the same
    /// enterprise number.
    pub fn register(&mut self, plugin: Box<dyn FlowPlugin>) -> Result<PluginId, ConfigError> {
        for field in plugin.describe_fields() {
            for existing in &self.plugins {
                for existing_field in existing.describe_fields() {
                    if existing_field.enterprise_number == field.enterprise_number
                        && existing_field.field_id == field.field_id
                    {
                        tracing::warn!(field = %field.name, id = field.field_id, "plugin field collides with existing field");
                        return Err(ConfigError::PluginFieldCollision {
                            name: field.name.to_string(),
                            id: field.field_id,
                        });
                    }
                }
            }
        }
        let id = self.plugins.len() as PluginId;
        self.plugins.push(plugin);
        tracing::info!(plugin_id = id, total_plugins = self.plugins.len(), "plugin registered");
        Ok(id)
    }

    pub fn get(&self, id: PluginId) -> Option<&dyn FlowPlugin> {
        self.plugins.get(id as usize).map(|b| b.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (PluginId, &dyn FlowPlugin)> {
        self.plugins
            .iter()
            .enumerate()
            .map(|(i, p)| (i as PluginId, p.as_ref()))
    }

    /// Dispatch `on_create` across every registered plugin, attaching
    /// whatever state each one returns to the new flow record.
    pub fn dispatch_create(&self, flow: &mut FlowRecord) {
        for (id, plugin) in self.iter() {
            if let Some(data) = plugin.on_create(flow) {
                flow.plugin_data.push(PluginData {
                    plugin_id: id,
                    data,
                });
            }
        }
    }

    pub fn dispatch_packet(&self, flow: &mut FlowRecord, payload: &[u8]) {
        // `on_packet` needs `&FlowRecord` (the whole record) alongside a
        // `&mut` to just its own slot's data, so each slot's data is taken
        // out for the call and put back rather than held as a live
        // reference into `flow.plugin_data` while `flow` itself is passed.
        for i in 0..flow.plugin_data.len() {
            let plugin_id = flow.plugin_data[i].plugin_id;
            let Some(plugin) = self.get(plugin_id) else {
                continue;
            };
            let mut data = std::mem::replace(&mut flow.plugin_data[i].data, Box::new(()));
            plugin.on_packet(flow, &mut data, payload);
            flow.plugin_data[i].data = data;
        }
    }

    pub fn dispatch_delete(&self, flow: &FlowRecord) {
        for plugin_data in &flow.plugin_data {
            if let Some(plugin) = self.get(plugin_data.plugin_id) {
                plugin.on_delete(flow, &plugin_data.data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPlugin;

    impl FlowPlugin for CountingPlugin {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn describe_fields(&self) -> Vec<PluginField> {
            vec![PluginField {
                name: "packetCount",
                field_id: 1,
                enterprise_number: 35632,
            }]
        }

        fn on_create(&self, _flow: &FlowRecord) -> Option<Box<dyn Any + Send>> {
            Some(Box::new(0u64))
        }
    }

    #[test]
    fn rejects_colliding_field_ids() {
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(CountingPlugin)).unwrap();
        let err = registry.register(Box::new(CountingPlugin)).unwrap_err();
        assert!(matches!(err, ConfigError::PluginFieldCollision { .. }));
    }
}
