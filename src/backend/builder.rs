//! Kernel builder
//!
//! The builder is the structured front end to template compilation: callers
//! select a numeric type, bind named integer constants, and compile against
//! a target engine. Compilation freezes the parameter record; the resulting
//! module is specialized once and reused for every launch.

use std::collections::BTreeMap;

use crate::backend::engine::{Capability, Engine};
use crate::backend::module::{KernelModule, KernelSpec, KernelTemplate};
use crate::error::{PrimForgeError, PrimResult};
use crate::memory::DataType;

/// Parameterized compiler for one kernel template
pub struct KernelBuilder {
    template: &'static KernelTemplate,
    data_type: Option<DataType>,
    defines: BTreeMap<String, i64>,
}

impl KernelBuilder {
    pub fn new(template: &'static KernelTemplate) -> Self {
        KernelBuilder {
            template,
            data_type: None,
            defines: BTreeMap::new(),
        }
    }

    /// Select the numeric type the kernel is specialized for
    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = Some(data_type);
    }

    /// Bind a named integer constant
    pub fn define_int(&mut self, name: &str, value: i64) {
        self.defines.insert(name.to_string(), value);
    }

    /// Compile the template against the target engine.
    ///
    /// Any failure is a runtime error and produces no module; the caller's
    /// initialization must treat it as terminal.
    pub fn build(self, engine: &Engine) -> PrimResult<KernelModule> {
        let data_type = self.data_type.ok_or_else(|| {
            PrimForgeError::RuntimeError(format!(
                "template '{}': no numeric-type selector bound",
                self.template.name
            ))
        })?;

        if !self.template.supported_types.contains(&data_type) {
            return Err(PrimForgeError::RuntimeError(format!(
                "template '{}' does not support {:?}",
                self.template.name, data_type
            )));
        }
        if data_type == DataType::F16 && !engine.mayiuse(Capability::HalfPrecision) {
            return Err(PrimForgeError::RuntimeError(format!(
                "device '{}' cannot compile f16 kernels",
                engine.device().name()
            )));
        }
        for name in self.template.required_defines {
            if !self.defines.contains_key(*name) {
                return Err(PrimForgeError::RuntimeError(format!(
                    "template '{}': required constant '{}' is not defined",
                    self.template.name, name
                )));
            }
        }

        let spec = KernelSpec::new(data_type, self.defines);
        (self.template.validate)(&spec).map_err(PrimForgeError::RuntimeError)?;

        tracing::debug!(
            template = self.template.name,
            ?data_type,
            device = engine.device().name(),
            "compiled kernel template"
        );
        Ok(KernelModule::new(self.template, spec, engine.clone()))
    }
}
