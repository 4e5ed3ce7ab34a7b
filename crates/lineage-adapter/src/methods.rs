//! Method table classification
//!
//! Every slot of a class's own table ends up in exactly one bucket:
//! defined with one visibility, explicitly undefined, or concealed (not
//! callable, but not attributable to an undef). The allocator slot and
//! slots without a method record are never reported.

use lineage_facts::{ClassField, EncodedVisibility, HostMemory, MethodRecord, UndefinedMarker};

use crate::adapter::Adapter;
use crate::error::{AdapterError, AdapterResult};
use crate::handle::{ClassHandle, MethodSet, MethodVisibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Defined(MethodVisibility),
    Undefined,
    Concealed,
}

impl<M: HostMemory> Adapter<M> {
    pub(crate) fn collect_defined(
        &self,
        class: ClassHandle,
        visibility: MethodVisibility,
    ) -> AdapterResult<MethodSet> {
        self.collect(class, |state| state == EntryState::Defined(visibility))
    }

    pub(crate) fn collect_undefined(&self, class: ClassHandle) -> AdapterResult<MethodSet> {
        if !self.facts.detects_undefined() {
            self.class_header(class)?;
            self.undefined_warning.warn_once(&self.facts.release);
            return Ok(MethodSet::default());
        }
        self.collect(class, |state| state == EntryState::Undefined)
    }

    fn collect(
        &self,
        class: ClassHandle,
        keep: impl Fn(EntryState) -> bool,
    ) -> AdapterResult<MethodSet> {
        self.class_header(class)?;
        let table = self.field(class, ClassField::MethodTable)?;
        let model = self.model();
        let entries = model.method_entries(table).map_err(|e| {
            AdapterError::inconsistent(format_args!("method table of {:?}", class), e)
        })?;

        let allocator = self.facts.symbols.allocator_serial;
        let mut names = MethodSet::default();
        for entry in entries {
            if entry.serial == allocator || entry.record == 0 {
                continue;
            }
            let record = model.method_record(entry.record).map_err(|e| {
                AdapterError::inconsistent(format_args!("method record {:#x}", entry.record), e)
            })?;
            if !keep(self.classify(&record)?) {
                continue;
            }
            let name = model.symbol_name(entry.serial).map_err(|e| {
                AdapterError::inconsistent(format_args!("symbol {}", entry.serial), e)
            })?;
            names.insert(name);
        }
        Ok(names)
    }

    fn classify(&self, record: &MethodRecord) -> AdapterResult<EntryState> {
        match self.facts.undefined {
            UndefinedMarker::NullBody if record.body == 0 => return Ok(EntryState::Undefined),
            UndefinedMarker::BodyType { mask, value, .. }
                if record.body_type.map(|t| t & mask) == Some(value & mask) =>
            {
                return Ok(EntryState::Undefined)
            }
            _ => {}
        }

        let word = record.visibility_word.ok_or_else(|| {
            AdapterError::InternalInconsistency(format!(
                "method record without body on {}",
                self.facts.release
            ))
        })?;
        match self.facts.visibility.decode(word) {
            EncodedVisibility::Visible(visibility) => Ok(EntryState::Defined(visibility)),
            EncodedVisibility::NotCallable => match self.facts.undefined {
                UndefinedMarker::VisibilityValue => Ok(EntryState::Undefined),
                _ => Ok(EntryState::Concealed),
            },
            EncodedVisibility::Unknown(value) => Err(AdapterError::InternalInconsistency(format!(
                "visibility value {:#x} unknown to {}",
                value, self.facts.release
            ))),
        }
    }
}
