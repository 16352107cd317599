// src/storage/record.rs

//! Persisted module record
//!
//! One module persists as a fixed big-endian binary record:
//!
//! ```text
//! location | symbolic_name | version | activator | classpath |
//! execution_env | dynamic_imports | start_level(i32) | status(i32) |
//! type(i32) | last_modified(i64) | generation(i32) | reference(bool) |
//! file_name | native_path_count(i32) | native_paths[count]
//! ```
//!
//! Nullable strings are a presence byte followed by a u16 length and
//! UTF-8 bytes; native paths are non-nullable strings. At save time the
//! registered [`DataHook`]s vote: any hook may forget a changed start
//! level (written as 1) or forget the started status bit.

use std::io::{Read, Write};

use crate::error::{Error, Result};

bitflags::bitflags! {
    /// Persistent status bits of a module record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Status: i32 {
        /// The module was persistently started
        const STARTED = 1 << 0;
        /// The module uses its declared activation policy
        const ACTIVATION_POLICY = 1 << 1;
    }
}

/// Save-time veto points over persisted state
pub trait DataHook: Send + Sync {
    /// Vote to drop a persistently changed start level; the record is
    /// then written with start level 1
    fn forget_start_level_change(&self, record: &ModuleRecord) -> bool {
        let _ = record;
        false
    }

    /// Vote to drop the persistently started flag; the record is then
    /// written with the started bit cleared
    fn forget_status_change(&self, record: &ModuleRecord) -> bool {
        let _ = record;
        false
    }
}

/// The persisted form of one module
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleRecord {
    pub location: Option<String>,
    pub symbolic_name: Option<String>,
    pub version: Option<String>,
    pub activator: Option<String>,
    pub classpath: Option<String>,
    pub execution_env: Option<String>,
    pub dynamic_imports: Option<String>,
    pub start_level: i32,
    pub status: Status,
    pub module_type: i32,
    pub last_modified: i64,
    pub generation: i32,
    pub reference: bool,
    pub file_name: Option<String>,
    pub native_paths: Vec<String>,
}

impl ModuleRecord {
    /// Writes the record, applying the data hooks' forget votes
    pub fn save<W: Write>(&self, out: &mut W, hooks: &[&dyn DataHook]) -> Result<()> {
        write_opt_string(out, self.location.as_deref())?;
        write_opt_string(out, self.symbolic_name.as_deref())?;
        write_opt_string(out, self.version.as_deref())?;
        write_opt_string(out, self.activator.as_deref())?;
        write_opt_string(out, self.classpath.as_deref())?;
        write_opt_string(out, self.execution_env.as_deref())?;
        write_opt_string(out, self.dynamic_imports.as_deref())?;

        let forget_level = hooks.iter().any(|h| h.forget_start_level_change(self));
        write_i32(out, if forget_level { 1 } else { self.start_level })?;

        let forget_status = hooks.iter().any(|h| h.forget_status_change(self));
        let status = if forget_status {
            self.status.difference(Status::STARTED)
        } else {
            self.status
        };
        write_i32(out, status.bits())?;

        write_i32(out, self.module_type)?;
        write_i64(out, self.last_modified)?;
        write_i32(out, self.generation)?;
        out.write_all(&[self.reference as u8])?;
        write_opt_string(out, self.file_name.as_deref())?;

        write_i32(out, self.native_paths.len() as i32)?;
        for path in &self.native_paths {
            write_string(out, path)?;
        }
        Ok(())
    }

    /// Reads a record previously written by [`ModuleRecord::save`]
    pub fn load<R: Read>(input: &mut R) -> Result<ModuleRecord> {
        let location = read_opt_string(input)?;
        let symbolic_name = read_opt_string(input)?;
        let version = read_opt_string(input)?;
        let activator = read_opt_string(input)?;
        let classpath = read_opt_string(input)?;
        let execution_env = read_opt_string(input)?;
        let dynamic_imports = read_opt_string(input)?;
        let start_level = read_i32(input)?;
        let status = Status::from_bits_truncate(read_i32(input)?);
        let module_type = read_i32(input)?;
        let last_modified = read_i64(input)?;
        let generation = read_i32(input)?;
        let reference = read_u8(input)? != 0;
        let file_name = read_opt_string(input)?;

        let count = read_i32(input)?;
        if count < 0 {
            return Err(invalid_data(format!("negative native path count {count}")));
        }
        let mut native_paths = Vec::with_capacity(count as usize);
        for _ in 0..count {
            native_paths.push(read_string(input)?);
        }

        Ok(ModuleRecord {
            location,
            symbolic_name,
            version,
            activator,
            classpath,
            execution_env,
            dynamic_imports,
            start_level,
            status,
            module_type,
            last_modified,
            generation,
            reference,
            file_name,
            native_paths,
        })
    }
}

fn invalid_data(message: String) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    ))
}

fn write_i32<W: Write>(out: &mut W, value: i32) -> Result<()> {
    out.write_all(&value.to_be_bytes())?;
    Ok(())
}

fn write_i64<W: Write>(out: &mut W, value: i64) -> Result<()> {
    out.write_all(&value.to_be_bytes())?;
    Ok(())
}

fn write_string<W: Write>(out: &mut W, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(invalid_data(format!(
            "string of {} bytes exceeds the record limit",
            bytes.len()
        )));
    }
    out.write_all(&(bytes.len() as u16).to_be_bytes())?;
    out.write_all(bytes)?;
    Ok(())
}

fn write_opt_string<W: Write>(out: &mut W, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => {
            out.write_all(&[1])?;
            write_string(out, value)
        }
        None => {
            out.write_all(&[0])?;
            Ok(())
        }
    }
}

fn read_u8<R: Read>(input: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i32<R: Read>(input: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_i64<R: Read>(input: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_string<R: Read>(input: &mut R) -> Result<String> {
    let mut len_buf = [0u8; 2];
    input.read_exact(&mut len_buf)?;
    let mut bytes = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    input.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|err| invalid_data(format!("invalid UTF-8 string: {err}")))
}

fn read_opt_string<R: Read>(input: &mut R) -> Result<Option<String>> {
    match read_u8(input)? {
        0 => Ok(None),
        _ => Ok(Some(read_string(input)?)),
    }
}
