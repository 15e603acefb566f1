//! The `debug_info_item` state machine.
//!
//! A tiny bytecode of its own: a header with the start line and the
//! parameter names, then opcodes advancing an `(address, line)` pair and
//! opening/closing local variable ranges. Every emitted event pins a
//! label at the current address so the code visitor can anchor it.
//!
//! See: <https://source.android.com/docs/core/runtime/dex-format#debug-info-item>

use std::collections::{BTreeSet, HashSet};

use log::trace;

use crate::dex::{Dex, MethodRef};
use crate::errors::DexError;
use crate::raw;
use crate::visitor::{DexDebugVisitor, Label};

const DBG_END_SEQUENCE: u8 = 0x00;
const DBG_ADVANCE_PC: u8 = 0x01;
const DBG_ADVANCE_LINE: u8 = 0x02;
const DBG_START_LOCAL: u8 = 0x03;
const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
const DBG_END_LOCAL: u8 = 0x05;
const DBG_RESTART_LOCAL: u8 = 0x06;
const DBG_SET_PROLOGUE_END: u8 = 0x07;
const DBG_SET_EPILOGUE_BEGIN: u8 = 0x08;
const DBG_SET_FILE: u8 = 0x09;
const DBG_FIRST_SPECIAL: u8 = 0x0a;

const DBG_LINE_BASE: i32 = -4;
const DBG_LINE_RANGE: u32 = 15;

#[allow(clippy::too_many_arguments)]
pub(crate) fn accept_debug_info(
    dex: &Dex,
    offset: u32,
    method: &MethodRef,
    is_static: bool,
    registers_size: u16,
    ins_size: u16,
    labels: &mut BTreeSet<u32>,
    ddv: &mut dyn DexDebugVisitor,
) -> Result<(), DexError> {
    let mut input = raw::slice_at(&dex.data, offset as usize)?;

    let mut address: u32 = 0;
    let mut line = raw::uleb128(&mut input)? as i32;

    // registers that ever held a local; RESTART_LOCAL may only name these
    let mut known_locals: HashSet<u16> = HashSet::new();

    // parameters land in the highest registers, `this` first for
    // instance methods, wide types taking two slots
    let mut register = registers_size.saturating_sub(ins_size);
    if !is_static {
        known_locals.insert(register);
        register = register.saturating_add(1);
    }

    let parameters_size = raw::uleb128(&mut input)?;
    for index in 0..parameters_size as usize {
        let name_index = raw::uleb128p1(&mut input)?;
        let name = if name_index >= 0 {
            Some(dex.string_at(name_index as u32)?)
        } else {
            None
        };
        ddv.visit_parameter_name(index, name.as_deref());

        if let Some(descriptor) = method.parameter_types.get(index) {
            known_locals.insert(register);
            let wide = descriptor == "J" || descriptor == "D";
            register = register.saturating_add(if wide { 2 } else { 1 });
        }
    }

    loop {
        let opcode = raw::read_u8(&mut input)?;
        trace!("debug op {opcode:#04x} at address {address:#x} line {line}");

        match opcode {
            DBG_END_SEQUENCE => break,
            DBG_ADVANCE_PC => {
                address = address.wrapping_add(raw::uleb128(&mut input)?);
            }
            DBG_ADVANCE_LINE => {
                line = line.wrapping_add(raw::sleb128(&mut input)?);
            }
            DBG_START_LOCAL | DBG_START_LOCAL_EXTENDED => {
                let register = raw::uleb128(&mut input)? as u16;
                let name_index = raw::uleb128p1(&mut input)?;
                let type_index = raw::uleb128p1(&mut input)?;
                let signature_index = if opcode == DBG_START_LOCAL_EXTENDED {
                    raw::uleb128p1(&mut input)?
                } else {
                    -1
                };

                let name = resolve_string(dex, name_index)?;
                let descriptor = resolve_type(dex, type_index)?;
                let signature = resolve_string(dex, signature_index)?;

                labels.insert(address);
                ddv.visit_start_local(
                    register,
                    Label(address),
                    name.as_deref(),
                    descriptor.as_deref(),
                    signature.as_deref(),
                );
                known_locals.insert(register);
            }
            DBG_END_LOCAL => {
                let register = raw::uleb128(&mut input)? as u16;
                labels.insert(address);
                ddv.visit_end_local(register, Label(address));
            }
            DBG_RESTART_LOCAL => {
                let register = raw::uleb128(&mut input)? as u16;
                if !known_locals.contains(&register) {
                    return Err(DexError::BadDebug(register));
                }
                labels.insert(address);
                ddv.visit_restart_local(register, Label(address));
            }
            DBG_SET_PROLOGUE_END => {
                labels.insert(address);
                ddv.visit_prologue(Label(address));
            }
            DBG_SET_EPILOGUE_BEGIN => {
                labels.insert(address);
                ddv.visit_epilogue(Label(address));
            }
            DBG_SET_FILE => {
                // file name is not re-exposed
                let _ = raw::uleb128p1(&mut input)?;
            }
            special => {
                let adjusted = (special - DBG_FIRST_SPECIAL) as u32;
                address = address.wrapping_add(adjusted / DBG_LINE_RANGE);
                line = line.wrapping_add(DBG_LINE_BASE + (adjusted % DBG_LINE_RANGE) as i32);

                labels.insert(address);
                ddv.visit_line_number(line, Label(address));
            }
        }
    }

    ddv.visit_end();

    Ok(())
}

fn resolve_string(dex: &Dex, index: i32) -> Result<Option<std::borrow::Cow<'_, str>>, DexError> {
    if index < 0 {
        return Ok(None);
    }
    Ok(Some(dex.string_at(index as u32)?))
}

fn resolve_type(dex: &Dex, index: i32) -> Result<Option<std::borrow::Cow<'_, str>>, DexError> {
    if index < 0 {
        return Ok(None);
    }
    Ok(Some(dex.type_at(index as u32)?))
}
