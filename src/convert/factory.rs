// Element factory
//
// Stages are created through the StageFactory trait so the run-scoped
// bookkeeping in StageSet can be exercised without GStreamer. A StageSet
// remembers what it already created: asking for the same role twice hands
// back the existing stage instead of making a second one.

use std::collections::HashMap;

use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;

use super::plan::{CapsSpec, PipelinePlan, PropertyValue, StageRole};
use super::{ConvertError, Result};

/// Creates and configures pipeline stages
pub trait StageFactory {
    type Stage: Clone;

    fn make(&self, factory: &str, name: &str) -> Result<Self::Stage>;

    fn configure(&self, stage: &Self::Stage, property: &str, value: &PropertyValue) -> Result<()>;

    /// Factories from `wanted` that cannot be instantiated at all
    fn missing(&self, _wanted: &[&str]) -> Vec<String> {
        Vec::new()
    }
}

/// Factory producing real GStreamer elements
#[derive(Debug, Clone, Copy, Default)]
pub struct GstStageFactory;

impl StageFactory for GstStageFactory {
    type Stage = gst::Element;

    fn make(&self, factory: &str, name: &str) -> Result<gst::Element> {
        gst::ElementFactory::make(factory)
            .name(name)
            .build()
            .map_err(|e| {
                log::error!("Failed to create {} ({}): {}", factory, name, e);
                ConvertError::ElementCreation {
                    factory: factory.to_string(),
                    name: name.to_string(),
                }
            })
    }

    fn configure(&self, stage: &gst::Element, property: &str, value: &PropertyValue) -> Result<()> {
        let invalid = |reason: String| ConvertError::Property {
            element: stage.name().to_string(),
            property: property.to_string(),
            reason,
        };
        // set_property_from_value panics on unknown properties or a type mismatch
        let pspec = stage
            .find_property(property)
            .ok_or_else(|| invalid("no such property".into()))?;
        let value = to_glib_value(value, pspec.value_type()).map_err(invalid)?;
        stage.set_property_from_value(property, &value);
        Ok(())
    }

    fn missing(&self, wanted: &[&str]) -> Vec<String> {
        crate::gstreamer_init::missing_elements(wanted)
    }
}

/// Convert a plan value into the exact type the property expects
fn to_glib_value(
    value: &PropertyValue,
    wanted: glib::Type,
) -> std::result::Result<glib::Value, String> {
    let out_of_range = |n: &i64| format!("{} is out of range for {}", n, wanted);
    let converted = match value {
        PropertyValue::Str(s) if wanted == glib::Type::STRING => s.to_value(),
        PropertyValue::Bool(b) if wanted == glib::Type::BOOL => b.to_value(),
        PropertyValue::Int(n) if wanted == glib::Type::I32 => {
            i32::try_from(*n).map_err(|_| out_of_range(n))?.to_value()
        }
        PropertyValue::Int(n) if wanted == glib::Type::U32 => {
            u32::try_from(*n).map_err(|_| out_of_range(n))?.to_value()
        }
        PropertyValue::Int(n) if wanted == glib::Type::I64 => n.to_value(),
        PropertyValue::Int(n) if wanted == glib::Type::U64 => {
            u64::try_from(*n).map_err(|_| out_of_range(n))?.to_value()
        }
        PropertyValue::Caps(caps) if wanted == gst::Caps::static_type() => {
            build_caps(caps).to_value()
        }
        other => return Err(format!("'{}' does not fit a {} property", other, wanted)),
    };
    Ok(converted)
}

fn build_caps(spec: &CapsSpec) -> gst::Caps {
    let mut builder = gst::Caps::builder(spec.media_type);
    if let Some(format) = spec.format {
        builder = builder.field("format", format);
    }
    if let Some(rate) = spec.framerate {
        builder = builder.field("framerate", rate.fraction());
    }
    builder.build()
}

/// Stages created for one run, keyed by role
#[derive(Debug)]
pub struct StageSet<S> {
    stages: HashMap<StageRole, S>,
}

impl<S: Clone> StageSet<S> {
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    /// Create the stage for `role` unless this run already has one
    pub fn ensure<F>(&mut self, factory: &F, role: StageRole, factory_name: &str) -> Result<&S>
    where
        F: StageFactory<Stage = S>,
    {
        if !self.stages.contains_key(&role) {
            let stage = factory.make(factory_name, role.instance_name())?;
            log::debug!("Created {} as {}", factory_name, role.instance_name());
            self.stages.insert(role, stage);
        }
        self.stages
            .get(&role)
            .ok_or_else(|| ConvertError::ElementCreation {
                factory: factory_name.to_string(),
                name: role.instance_name().to_string(),
            })
    }

    /// Create and configure every stage in `plan`
    ///
    /// On failure the partially built set is dropped; nothing has been added
    /// to a pipeline or linked at this point.
    pub fn materialize<F>(plan: &PipelinePlan, factory: &F) -> Result<Self>
    where
        F: StageFactory<Stage = S>,
    {
        let missing = factory.missing(&plan.factories());
        if !missing.is_empty() {
            return Err(ConvertError::MissingElements(missing));
        }

        let mut set = Self::new();
        for spec in plan.stages() {
            let stage = set.ensure(factory, spec.role, spec.factory)?.clone();
            for (property, value) in &spec.properties {
                factory.configure(&stage, property, value)?;
            }
        }
        Ok(set)
    }

    pub fn get(&self, role: StageRole) -> Option<&S> {
        self.stages.get(&role)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages in plan order
    pub fn in_plan_order(&self, plan: &PipelinePlan) -> Vec<S> {
        plan.stages()
            .iter()
            .filter_map(|spec| self.stages.get(&spec.role).cloned())
            .collect()
    }
}

impl<S: Clone> Default for StageSet<S> {
    fn default() -> Self {
        Self::new()
    }
}
