//! Shell variables.
//!
//! Each variable is one tracked record holding its name and a tagged value
//! (serde_json, so the discriminant travels with the data). The table is a
//! `DynArray` of record addresses; lookups are linear scans by name.

use std::fmt;

use serde::{Deserialize, Serialize};

use memtrack_core::prelude::{Addr, RawAlloc};
use memtrack_mem::{DynArray, Tracker};

use crate::error::{Result, ShellError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    /// Type a literal: integer, then finite float, then boolean, else string.
    pub fn infer(text: &str) -> Self {
        if let Ok(v) = text.parse::<i64>() {
            return Value::Int(v);
        }
        if let Some(v) = text.parse::<f64>().ok().filter(|v| v.is_finite()) {
            return Value::Float(v);
        }
        match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Str(text.to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:.6}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Serialize)]
struct RecordRef<'a> {
    name: &'a str,
    value: &'a Value,
}

#[derive(Deserialize)]
struct Record {
    name: String,
    value: Value,
}

/// Names are `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ShellError::InvalidName(name.to_string()))
    }
}

pub struct VarTable {
    slots: DynArray,
}

impl VarTable {
    pub fn new<A: RawAlloc>(mt: &mut Tracker<A>) -> Result<Self> {
        Ok(Self {
            slots: DynArray::new(mt)?,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get<A: RawAlloc>(&self, mt: &Tracker<A>, name: &str) -> Result<Option<Value>> {
        Ok(self.find(mt, name)?.map(|(_, rec)| rec.value))
    }

    /// Create or overwrite a variable. On failure the table is unchanged.
    pub fn set<A: RawAlloc>(
        &mut self,
        mt: &mut Tracker<A>,
        name: &str,
        value: Value,
    ) -> Result<()> {
        validate_name(name)?;
        let bytes = serde_json::to_vec(&RecordRef {
            name,
            value: &value,
        })?;
        let existing = self.find(mt, name)?.map(|(index, _)| index);
        let addr = mt.alloc_bytes(&bytes)?;

        let stored = match existing {
            Some(index) => self.slots.set(mt, index, addr).map(|old| mt.release(old)),
            None => self.slots.push(mt, addr),
        };
        if let Err(e) = stored {
            mt.release(addr);
            return Err(e.into());
        }
        tracing::debug!(name, kind = value.kind(), "variable set");
        Ok(())
    }

    /// Drop a variable. The last variable moves into its slot.
    pub fn remove<A: RawAlloc>(
        &mut self,
        mt: &mut Tracker<A>,
        name: &str,
    ) -> Result<Option<Value>> {
        let Some((index, rec)) = self.find(mt, name)? else {
            return Ok(None);
        };
        let addr = self.slots.swap_remove(mt, index)?;
        mt.release(addr);
        Ok(Some(rec.value))
    }

    /// Variable names in table order (which removals reshuffle).
    pub fn names<A: RawAlloc>(&self, mt: &Tracker<A>) -> Result<Vec<String>> {
        self.slots
            .iter(mt)
            .map(|addr| decode(mt, addr).map(|rec| rec.name))
            .collect()
    }

    /// Give every record and the table itself back to the tracker.
    pub fn release<A: RawAlloc>(self, mt: &mut Tracker<A>) {
        mt.release_array(self.slots, true);
    }

    fn find<A: RawAlloc>(&self, mt: &Tracker<A>, name: &str) -> Result<Option<(usize, Record)>> {
        for (index, addr) in self.slots.iter(mt).enumerate() {
            let rec = decode(mt, addr)?;
            if rec.name == name {
                return Ok(Some((index, rec)));
            }
        }
        Ok(None)
    }
}

fn decode<A: RawAlloc>(mt: &Tracker<A>, addr: Addr) -> Result<Record> {
    let bytes = mt
        .bytes(addr)
        .ok_or_else(|| ShellError::Corrupt(format!("variable record at {addr} is not tracked")))?;
    Ok(serde_json::from_slice(bytes)?)
}
