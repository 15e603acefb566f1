//! `code_item` decoding: try/catch resolution and the two-pass
//! instruction traversal.
//!
//! Pass one discovers every reachable instruction start from the method
//! entry and the exception handlers, folding degenerate compares and
//! flagging undecodable offsets. Pass two walks the discovered starts in
//! address order and emits the visitor calls, interleaving labels. A bad
//! instruction becomes a placeholder emission instead of aborting the
//! method.

use std::collections::BTreeSet;

use log::{trace, warn};

use crate::debug::accept_debug_info;
use crate::dex::{Dex, MethodRef};
use crate::errors::DexError;
use crate::op::{self, Format, IndexKind, Op};
use crate::raw;
use crate::visitor::{CatchHandler, Config, ConstValue, DexCodeVisitor, FillArrayData, Label};

const PACKED_SWITCH_PAYLOAD: u16 = 0x0100;
const SPARSE_SWITCH_PAYLOAD: u16 = 0x0200;
const FILL_ARRAY_PAYLOAD: u16 = 0x0300;

struct TryItem {
    start: u32,
    end: u32,
    handlers: Vec<CatchHandler>,
}

pub(crate) fn accept_code(
    dex: &Dex,
    config: Config,
    code_off: u32,
    method: &MethodRef,
    is_static: bool,
    dcv: &mut dyn DexCodeVisitor,
) -> Result<(), DexError> {
    let mut input = raw::slice_at(&dex.data, code_off as usize)?;

    let registers_size = raw::read_u16(&mut input)?;
    let ins_size = raw::read_u16(&mut input)?;
    let _outs_size = raw::read_u16(&mut input)?;
    let tries_size = raw::read_u16(&mut input)?;
    let debug_info_off = raw::read_u32(&mut input)?;
    let insn_count = raw::read_u32(&mut input)?;
    let insns = raw::read_bytes(&mut input, insn_count as usize * 2)?;

    let mut labels: BTreeSet<u32> = BTreeSet::new();
    let mut seeds: Vec<u32> = vec![0];
    let mut tries: Vec<TryItem> = Vec::new();

    if tries_size > 0 {
        if insn_count % 2 == 1 {
            let _padding = raw::read_u16(&mut input)?;
        }

        let mut raw_tries = Vec::with_capacity(tries_size as usize);
        for _ in 0..tries_size {
            let start = raw::read_u32(&mut input)?;
            let count = raw::read_u16(&mut input)?;
            let handler_off = raw::read_u16(&mut input)?;
            raw_tries.push((start, count, handler_off));
        }

        // the encoded_catch_handler_list starts right after the try
        // items; handler_off values are relative to it
        let handlers_data = input;

        for (start, count, handler_off) in raw_tries {
            let mut hinput = handlers_data
                .get(handler_off as usize..)
                .ok_or(DexError::Eof)?;

            let list_size = raw::sleb128(&mut hinput)?;
            let typed = list_size.unsigned_abs() as usize;

            let mut handlers = Vec::with_capacity(typed + 1);
            for _ in 0..typed {
                let type_index = raw::uleb128(&mut hinput)?;
                let address = raw::uleb128(&mut hinput)?;
                handlers.push(CatchHandler {
                    exception_type: Some(dex.type_at(type_index)?.into_owned()),
                    handler: Label(address),
                });
                labels.insert(address);
                seeds.push(address);
            }
            if list_size <= 0 {
                let address = raw::uleb128(&mut hinput)?;
                handlers.push(CatchHandler {
                    exception_type: None,
                    handler: Label(address),
                });
                labels.insert(address);
                seeds.push(address);
            }

            let end = start + count as u32;
            labels.insert(start);
            labels.insert(end);
            tries.push(TryItem {
                start,
                end,
                handlers,
            });
        }
    }

    let mut visited = vec![false; insn_count as usize];
    let mut bad_ops = vec![false; insn_count as usize];
    find_labels(
        dex,
        insns,
        insn_count,
        seeds,
        &mut labels,
        &mut visited,
        &mut bad_ops,
    )?;

    dcv.visit_register(registers_size);
    for item in &tries {
        dcv.visit_try_catch(Label(item.start), Label(item.end), &item.handlers);
    }

    if debug_info_off != 0 && !config.contains(Config::SKIP_DEBUG) {
        if let Some(ddv) = dcv.visit_debug() {
            accept_debug_info(
                dex,
                debug_info_off,
                method,
                is_static,
                registers_size,
                ins_size,
                &mut labels,
                ddv,
            )?;
        }
    }

    emit_insns(dex, insns, insn_count, &labels, &visited, &bad_ops, dcv)?;
    dcv.visit_end();

    Ok(())
}

/// Reachability pass: work the queue of instruction starts, collect
/// branch-target labels, fold degenerate compares and mark bad offsets.
fn find_labels(
    dex: &Dex,
    insns: &[u8],
    insn_count: u32,
    mut queue: Vec<u32>,
    labels: &mut BTreeSet<u32>,
    visited: &mut [bool],
    bad_ops: &mut [bool],
) -> Result<(), DexError> {
    'walk: while let Some(offset) = queue.pop() {
        if offset >= insn_count {
            continue;
        }
        let o = offset as usize;
        if visited[o] {
            continue;
        }
        visited[o] = true;

        let byte_off = o * 2;
        let opcode = insns[byte_off];
        let Some(info) = Op(opcode).info() else {
            warn!("zero-width instruction {opcode:#04x} at code unit {offset:#x}");
            bad_ops[o] = true;
            continue;
        };
        trace!("discover {offset:#06x}: {}", info.mnemonic);

        // a nop whose high byte is a payload marker covers the whole
        // payload; execution resumes past it
        if opcode == 0x00 {
            let next = match insns[byte_off + 1] {
                0x01 => match raw::u16_at(insns, byte_off + 2) {
                    Ok(size) => offset as u64 + 4 + 2 * size as u64,
                    Err(_) => {
                        warn!("truncated packed-switch payload at {offset:#x}");
                        bad_ops[o] = true;
                        continue;
                    }
                },
                0x02 => match raw::u16_at(insns, byte_off + 2) {
                    Ok(size) => offset as u64 + 2 + 4 * size as u64,
                    Err(_) => {
                        warn!("truncated sparse-switch payload at {offset:#x}");
                        bad_ops[o] = true;
                        continue;
                    }
                },
                0x03 => match (
                    raw::u16_at(insns, byte_off + 2),
                    raw::u32_at(insns, byte_off + 4),
                ) {
                    (Ok(width), Ok(size)) => {
                        offset as u64 + 4 + (size as u64 * width as u64 + 1) / 2
                    }
                    _ => {
                        warn!("truncated fill-array-data payload at {offset:#x}");
                        bad_ops[o] = true;
                        continue;
                    }
                },
                _ => offset as u64 + 1,
            };
            if next <= insn_count as u64 {
                queue.push(next as u32);
            }
            continue;
        }

        let width = info.format.size();
        if offset + width > insn_count {
            warn!(
                "instruction {} at {offset:#x} runs past the end of the method",
                info.mnemonic
            );
            bad_ops[o] = true;
            continue;
        }

        let mut can_continue = info.can_continue();

        if info.can_branch() {
            let relative = match info.format {
                Format::F10t => raw::i8_at(insns, byte_off + 1)? as i64,
                Format::F20t | Format::F21t | Format::F22t => {
                    raw::i16_at(insns, byte_off + 2)? as i64
                }
                _ => raw::i32_at(insns, byte_off + 2)? as i64,
            };
            let target = offset as i64 + relative;
            let mut take_branch = true;

            // a compare of a register against itself has a fixed outcome
            if info.format == Format::F22t {
                let (a, b) = nibbles(insns[byte_off + 1]);
                if a == b {
                    match Op(opcode) {
                        op::IF_EQ | op::IF_GE | op::IF_LE => can_continue = false,
                        _ => take_branch = false,
                    }
                }
            }

            if take_branch {
                if target < 0 || target > insn_count as i64 {
                    warn!(
                        "jump out of insn: {} at {offset:#x} targets {target:#x}",
                        info.mnemonic
                    );
                    bad_ops[o] = true;
                    continue;
                }
                labels.insert(target as u32);
                queue.push(target as u32);
            }
        }

        if info.can_switch() {
            match switch_case_targets(insns, insn_count, offset) {
                Ok(targets) => {
                    for target in targets {
                        if target < 0 || target > insn_count as i64 {
                            warn!("jump out of insn: switch case at {offset:#x} targets {target:#x}");
                            bad_ops[o] = true;
                            continue 'walk;
                        }
                        labels.insert(target as u32);
                        queue.push(target as u32);
                    }
                }
                Err(_) => {
                    warn!("bad switch payload at {offset:#x}");
                    bad_ops[o] = true;
                    continue;
                }
            }
        }

        if Op(opcode) == op::FILL_ARRAY_DATA && fill_array_payload(insns, insn_count, offset).is_err()
        {
            warn!("bad fill-array-data payload at {offset:#x}");
            bad_ops[o] = true;
            continue;
        }

        if info.index != IndexKind::None {
            let index = match info.format {
                Format::F31c => raw::u32_at(insns, byte_off + 2)?,
                _ => raw::u16_at(insns, byte_off + 2)? as u32,
            };
            let pool_size = match info.index {
                IndexKind::String => dex.string_ids.len(),
                IndexKind::Type => dex.type_ids.len(),
                IndexKind::Field => dex.field_ids.len(),
                IndexKind::Method => dex.method_ids.len(),
                IndexKind::None => usize::MAX,
            };
            if index as usize >= pool_size {
                warn!(
                    "{:?} index {index} out of range at {offset:#x}",
                    info.index
                );
                bad_ops[o] = true;
                continue;
            }
        }

        if can_continue {
            queue.push(offset + width);
        }
    }

    Ok(())
}

/// Absolute case targets of a switch instruction, or an error when its
/// payload is unreadable.
fn switch_case_targets(insns: &[u8], insn_count: u32, offset: u32) -> Result<Vec<i64>, DexError> {
    let byte_off = offset as usize * 2;
    let payload = offset as i64 + raw::i32_at(insns, byte_off + 2)? as i64;
    if payload < 0 || payload >= insn_count as i64 {
        return Err(DexError::BadPayload(offset));
    }
    let t2 = payload as usize * 2;

    let ident = raw::u16_at(insns, t2)?;
    let size = raw::u16_at(insns, t2 + 2)? as usize;

    let targets_at = match ident {
        PACKED_SWITCH_PAYLOAD => t2 + 8,
        SPARSE_SWITCH_PAYLOAD => t2 + 4 + 4 * size,
        _ => return Err(DexError::BadPayload(offset)),
    };
    if targets_at + 4 * size > insns.len() {
        return Err(DexError::BadPayload(offset));
    }

    let mut targets = Vec::with_capacity(size);
    for i in 0..size {
        targets.push(offset as i64 + raw::i32_at(insns, targets_at + 4 * i)? as i64);
    }

    Ok(targets)
}

/// Validate a `fill-array-data` payload and return its code-unit offset.
fn fill_array_payload(insns: &[u8], insn_count: u32, offset: u32) -> Result<usize, DexError> {
    let byte_off = offset as usize * 2;
    let payload = offset as i64 + raw::i32_at(insns, byte_off + 2)? as i64;
    if payload < 0 || payload >= insn_count as i64 {
        return Err(DexError::BadPayload(offset));
    }
    let t2 = payload as usize * 2;

    if raw::u16_at(insns, t2)? != FILL_ARRAY_PAYLOAD {
        return Err(DexError::BadPayload(offset));
    }
    let width = raw::u16_at(insns, t2 + 2)? as u64;
    if !matches!(width, 1 | 2 | 4 | 8) {
        return Err(DexError::BadPayload(offset));
    }
    let size = raw::u32_at(insns, t2 + 4)? as u64;
    if t2 as u64 + 8 + size * width > insns.len() as u64 {
        return Err(DexError::BadPayload(offset));
    }

    Ok(t2)
}

fn read_fill_array(insns: &[u8], t2: usize) -> Result<FillArrayData, DexError> {
    let width = raw::u16_at(insns, t2 + 2)? as usize;
    let size = raw::u32_at(insns, t2 + 4)? as usize;
    let bytes = insns
        .get(t2 + 8..t2 + 8 + size * width)
        .ok_or(DexError::Eof)?;

    let data = match width {
        1 => FillArrayData::Byte(bytes.iter().map(|byte| *byte as i8).collect()),
        2 => FillArrayData::Short(
            bytes
                .chunks_exact(2)
                .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
                .collect(),
        ),
        4 => FillArrayData::Int(
            bytes
                .chunks_exact(4)
                .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        ),
        8 => FillArrayData::Long(
            bytes
                .chunks_exact(8)
                .map(|chunk| {
                    let mut value = [0u8; 8];
                    value.copy_from_slice(chunk);
                    i64::from_le_bytes(value)
                })
                .collect(),
        ),
        _ => return Err(DexError::BadPayload(t2 as u32 / 2)),
    };

    Ok(data)
}

/// Emission pass: walk the discovered starts in address order, emitting
/// pending labels before each instruction.
fn emit_insns(
    dex: &Dex,
    insns: &[u8],
    insn_count: u32,
    labels: &BTreeSet<u32>,
    visited: &[bool],
    bad_ops: &[bool],
    dcv: &mut dyn DexCodeVisitor,
) -> Result<(), DexError> {
    let mut pending = labels.iter().copied().peekable();

    for offset in 0..insn_count {
        let o = offset as usize;
        if !visited[o] {
            continue;
        }

        while let Some(&label) = pending.peek() {
            if label > offset {
                break;
            }
            dcv.visit_label(Label(label));
            pending.next();
        }

        let byte_off = o * 2;
        let opcode = insns[byte_off];
        if bad_ops[o] {
            dcv.visit_bad_op(offset, opcode);
            continue;
        }
        let Some(info) = Op(opcode).info() else {
            continue;
        };

        emit_one(dex, insns, offset, Op(opcode), info.format, info.index, dcv)?;
    }

    // labels at or past the end of the method (try ends, handler stubs)
    for label in pending {
        dcv.visit_label(Label(label));
    }

    Ok(())
}

fn emit_one(
    dex: &Dex,
    insns: &[u8],
    offset: u32,
    op: Op,
    format: Format,
    index_kind: IndexKind,
    dcv: &mut dyn DexCodeVisitor,
) -> Result<(), DexError> {
    let byte_off = offset as usize * 2;

    match format {
        Format::F10x => {
            // payload pseudo-instructions are data, not statements
            if op == op::NOP && insns[byte_off + 1] != 0 {
                return Ok(());
            }
            dcv.visit_stmt0r(op);
        }
        Format::F12x => {
            let (a, b) = nibbles(insns[byte_off + 1]);
            dcv.visit_stmt2r(op, a as u16, b as u16);
        }
        Format::F11n => {
            let (a, literal) = nibbles(insns[byte_off + 1]);
            let literal = ((literal as i8) << 4) >> 4;
            dcv.visit_const_stmt(op, a as u16, &ConstValue::Int(literal as i32));
        }
        Format::F11x => {
            dcv.visit_stmt1r(op, raw::u8_at(insns, byte_off + 1)? as u16);
        }
        Format::F10t => {
            let target = offset as i64 + raw::i8_at(insns, byte_off + 1)? as i64;
            dcv.visit_jump_stmt(op, &[], Label(target as u32));
        }
        Format::F20t => {
            let target = offset as i64 + raw::i16_at(insns, byte_off + 2)? as i64;
            dcv.visit_jump_stmt(op, &[], Label(target as u32));
        }
        Format::F30t => {
            let target = offset as i64 + raw::i32_at(insns, byte_off + 2)? as i64;
            dcv.visit_jump_stmt(op, &[], Label(target as u32));
        }
        Format::F22x => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let b = raw::u16_at(insns, byte_off + 2)?;
            dcv.visit_stmt2r(op, a, b);
        }
        Format::F32x => {
            let a = raw::u16_at(insns, byte_off + 2)?;
            let b = raw::u16_at(insns, byte_off + 4)?;
            dcv.visit_stmt2r(op, a, b);
        }
        Format::F21t => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let target = offset as i64 + raw::i16_at(insns, byte_off + 2)? as i64;
            dcv.visit_jump_stmt(op, &[a], Label(target as u32));
        }
        Format::F22t => {
            let (a, b) = nibbles(insns[byte_off + 1]);
            let target = offset as i64 + raw::i16_at(insns, byte_off + 2)? as i64;
            if a == b {
                match op {
                    op::IF_EQ | op::IF_GE | op::IF_LE => {
                        dcv.visit_jump_stmt(op::GOTO, &[], Label(target as u32));
                    }
                    _ => dcv.visit_stmt0r(op::NOP),
                }
            } else {
                dcv.visit_jump_stmt(op, &[a as u16, b as u16], Label(target as u32));
            }
        }
        Format::F21s => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let literal = raw::i16_at(insns, byte_off + 2)?;
            let value = if op == op::CONST_WIDE_16 {
                ConstValue::Wide(literal as i64)
            } else {
                ConstValue::Int(literal as i32)
            };
            dcv.visit_const_stmt(op, a, &value);
        }
        Format::F21h => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let literal = raw::i16_at(insns, byte_off + 2)?;
            let value = if op == op::CONST_HIGH16 {
                ConstValue::Int((literal as i32) << 16)
            } else {
                ConstValue::Wide((literal as i64) << 48)
            };
            dcv.visit_const_stmt(op, a, &value);
        }
        Format::F31i => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let literal = raw::i32_at(insns, byte_off + 2)?;
            let value = if op == op::CONST_WIDE_32 {
                ConstValue::Wide(literal as i64)
            } else {
                ConstValue::Int(literal)
            };
            dcv.visit_const_stmt(op, a, &value);
        }
        Format::F51l => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let mut literal = 0u64;
            for i in 0..4 {
                literal |= (raw::u16_at(insns, byte_off + 2 + 2 * i)? as u64) << (16 * i);
            }
            dcv.visit_const_stmt(op, a, &ConstValue::Wide(literal as i64));
        }
        Format::F21c => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let index = raw::u16_at(insns, byte_off + 2)? as u32;
            match index_kind {
                IndexKind::String => {
                    let value = ConstValue::String(dex.string_at(index)?.into_owned());
                    dcv.visit_const_stmt(op, a, &value);
                }
                IndexKind::Field => {
                    dcv.visit_field_stmt(op, a, None, &dex.get_field(index)?);
                }
                IndexKind::Type => {
                    let descriptor = dex.type_at(index)?;
                    if op == op::CONST_CLASS {
                        let value = ConstValue::Type(descriptor.into_owned());
                        dcv.visit_const_stmt(op, a, &value);
                    } else {
                        dcv.visit_type_stmt(op, a, None, &descriptor);
                    }
                }
                _ => {}
            }
        }
        Format::F31c => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let index = raw::u32_at(insns, byte_off + 2)?;
            let value = ConstValue::String(dex.string_at(index)?.into_owned());
            dcv.visit_const_stmt(op, a, &value);
        }
        Format::F22c => {
            let (a, b) = nibbles(insns[byte_off + 1]);
            let index = raw::u16_at(insns, byte_off + 2)? as u32;
            match index_kind {
                IndexKind::Field => {
                    dcv.visit_field_stmt(op, a as u16, Some(b as u16), &dex.get_field(index)?);
                }
                IndexKind::Type => {
                    dcv.visit_type_stmt(op, a as u16, Some(b as u16), &dex.type_at(index)?);
                }
                _ => {}
            }
        }
        Format::F23x => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let b = raw::u8_at(insns, byte_off + 2)? as u16;
            let c = raw::u8_at(insns, byte_off + 3)? as u16;
            dcv.visit_stmt3r(op, a, b, c);
        }
        Format::F22b => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let b = raw::u8_at(insns, byte_off + 2)? as u16;
            let literal = raw::i8_at(insns, byte_off + 3)? as i32;
            dcv.visit_stmt2r1n(op, a, b, literal);
        }
        Format::F22s => {
            let (a, b) = nibbles(insns[byte_off + 1]);
            let literal = raw::i16_at(insns, byte_off + 2)? as i32;
            dcv.visit_stmt2r1n(op, a as u16, b as u16, literal);
        }
        Format::F35c => {
            let lead = raw::u8_at(insns, byte_off + 1)?;
            let count = (lead >> 4) as usize;
            let g = (lead & 0xf) as u16;
            let index = raw::u16_at(insns, byte_off + 2)? as u32;
            let (c, d) = nibbles(raw::u8_at(insns, byte_off + 4)?);
            let (e, f) = nibbles(raw::u8_at(insns, byte_off + 5)?);

            let all = [c as u16, d as u16, e as u16, f as u16, g];
            if count > 5 {
                warn!("register count {count} out of range at {offset:#x}");
            }
            let registers = &all[..count.min(5)];

            match index_kind {
                IndexKind::Method => {
                    dcv.visit_method_stmt(op, registers, &dex.get_method(index)?);
                }
                IndexKind::Type => {
                    dcv.visit_filled_new_array_stmt(op, registers, &dex.type_at(index)?);
                }
                _ => {}
            }
        }
        Format::F3rc => {
            let count = raw::u8_at(insns, byte_off + 1)? as u16;
            let index = raw::u16_at(insns, byte_off + 2)? as u32;
            let base = raw::u16_at(insns, byte_off + 4)?;
            let registers: Vec<u16> = (0..count).map(|i| base.wrapping_add(i)).collect();

            match index_kind {
                IndexKind::Method => {
                    dcv.visit_method_stmt(op, &registers, &dex.get_method(index)?);
                }
                IndexKind::Type => {
                    dcv.visit_filled_new_array_stmt(op, &registers, &dex.type_at(index)?);
                }
                _ => {}
            }
        }
        Format::F31t => {
            let a = raw::u8_at(insns, byte_off + 1)? as u16;
            let payload = offset as i64 + raw::i32_at(insns, byte_off + 2)? as i64;
            let t2 = payload as usize * 2;

            match op {
                op::FILL_ARRAY_DATA => {
                    let data = read_fill_array(insns, t2)?;
                    dcv.visit_fill_array_data_stmt(op, a, &data);
                }
                op::PACKED_SWITCH => {
                    let size = raw::u16_at(insns, t2 + 2)? as usize;
                    let first_key = raw::i32_at(insns, t2 + 4)?;
                    let mut targets = Vec::with_capacity(size);
                    for i in 0..size {
                        let target =
                            offset as i64 + raw::i32_at(insns, t2 + 8 + 4 * i)? as i64;
                        targets.push(Label(target as u32));
                    }
                    dcv.visit_packed_switch_stmt(op, a, first_key, &targets);
                }
                op::SPARSE_SWITCH => {
                    let size = raw::u16_at(insns, t2 + 2)? as usize;
                    let mut keys = Vec::with_capacity(size);
                    let mut targets = Vec::with_capacity(size);
                    for i in 0..size {
                        keys.push(raw::i32_at(insns, t2 + 4 + 4 * i)?);
                    }
                    for i in 0..size {
                        let target = offset as i64
                            + raw::i32_at(insns, t2 + 4 + 4 * size + 4 * i)? as i64;
                        targets.push(Label(target as u32));
                    }
                    dcv.visit_sparse_switch_stmt(op, a, &keys, &targets);
                }
                _ => {}
            }
        }
    }

    Ok(())
}

#[inline]
fn nibbles(byte: u8) -> (u8, u8) {
    (byte & 0xf, byte >> 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Events(Vec<String>);

    impl DexCodeVisitor for Events {
        fn visit_register(&mut self, registers: u16) {
            self.0.push(format!("registers {registers}"));
        }

        fn visit_label(&mut self, label: Label) {
            self.0.push(format!("label {}", label.0));
        }

        fn visit_try_catch(&mut self, start: Label, end: Label, handlers: &[CatchHandler]) {
            let rendered: Vec<String> = handlers
                .iter()
                .map(|handler| {
                    format!(
                        "{} -> {}",
                        handler.exception_type.as_deref().unwrap_or("<any>"),
                        handler.handler.0
                    )
                })
                .collect();
            self.0
                .push(format!("try {}..{} [{}]", start.0, end.0, rendered.join(", ")));
        }

        fn visit_stmt0r(&mut self, op: Op) {
            self.0.push(op.mnemonic().to_owned());
        }

        fn visit_stmt1r(&mut self, op: Op, a: u16) {
            self.0.push(format!("{} v{a}", op.mnemonic()));
        }

        fn visit_const_stmt(&mut self, op: Op, register: u16, value: &ConstValue) {
            self.0
                .push(format!("{} v{register} {value:?}", op.mnemonic()));
        }

        fn visit_jump_stmt(&mut self, op: Op, registers: &[u16], target: Label) {
            self.0
                .push(format!("{} {registers:?} -> {}", op.mnemonic(), target.0));
        }

        fn visit_bad_op(&mut self, offset: u32, opcode: u8) {
            self.0.push(format!("bad {opcode:#04x} at {offset}"));
        }

        fn visit_fill_array_data_stmt(&mut self, op: Op, register: u16, data: &FillArrayData) {
            self.0
                .push(format!("{} v{register} {data:?}", op.mnemonic()));
        }

        fn visit_packed_switch_stmt(
            &mut self,
            op: Op,
            register: u16,
            first_key: i32,
            targets: &[Label],
        ) {
            let rendered: Vec<u32> = targets.iter().map(|label| label.0).collect();
            self.0.push(format!(
                "{} v{register} first={first_key} {rendered:?}",
                op.mnemonic()
            ));
        }
    }

    fn method() -> MethodRef {
        MethodRef {
            owner: "La;".to_owned(),
            name: "m".to_owned(),
            parameter_types: Vec::new(),
            return_type: "V".to_owned(),
        }
    }

    /// Wrap code units in a minimal code_item at offset 0.
    fn code_dex(registers: u16, units: &[u16]) -> Dex {
        let mut data = Vec::new();
        data.extend_from_slice(&registers.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes()); // ins_size
        data.extend_from_slice(&0u16.to_le_bytes()); // outs_size
        data.extend_from_slice(&0u16.to_le_bytes()); // tries_size
        data.extend_from_slice(&0u32.to_le_bytes()); // debug_info_off
        data.extend_from_slice(&(units.len() as u32).to_le_bytes());
        for unit in units {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        Dex {
            data,
            ..Dex::default()
        }
    }

    fn run(registers: u16, units: &[u16]) -> Vec<String> {
        let dex = code_dex(registers, units);
        let mut events = Events::default();
        accept_code(&dex, Config::empty(), 0, &method(), true, &mut events).unwrap();
        events.0
    }

    #[test]
    fn compare_of_equal_registers_becomes_goto() {
        // if-eq v3, v3, +2; return-void
        let events = run(4, &[0x3332, 0x0002, 0x000e]);
        assert_eq!(
            events,
            vec!["registers 4", "goto [] -> 2", "label 2", "return-void"]
        );
    }

    #[test]
    fn never_taken_compare_becomes_nop() {
        // if-ne v3, v3, +2; return-void
        let events = run(4, &[0x3333, 0x0002, 0x000e]);
        assert_eq!(events, vec!["registers 4", "nop", "return-void"]);
    }

    #[test]
    fn bad_opcode_is_reported_in_place() {
        // if-eqz v0, +3; <garbage>; return-void
        let events = run(1, &[0x0038, 0x0003, 0x00ff, 0x000e]);
        assert_eq!(
            events,
            vec![
                "registers 1",
                "if-eqz [0] -> 3",
                "bad 0xff at 2",
                "label 3",
                "return-void"
            ]
        );
    }

    #[test]
    fn label_inside_a_wider_instruction() {
        // const/16 v0, #14; if-eqz v0, -1; return-void
        // the branch lands in the middle of const/16, whose literal unit
        // happens to decode as return-void
        let events = run(1, &[0x0013, 0x000e, 0x0038, 0xffff, 0x000e]);
        assert_eq!(
            events,
            vec![
                "registers 1",
                "const/16 v0 Int(14)",
                "label 1",
                "return-void",
                "if-eqz [0] -> 1",
                "return-void"
            ]
        );
    }

    #[test]
    fn packed_switch_payload() {
        let events = run(
            1,
            &[
                0x002b, // packed-switch v0
                0x0004, 0x0000, // payload at +4
                0x000e, // return-void (fallthrough and case target)
                0x0100, // payload ident
                0x0001, // size
                0x000a, 0x0000, // first_key = 10
                0x0003, 0x0000, // case target +3
            ],
        );
        assert_eq!(
            events,
            vec![
                "registers 1",
                "packed-switch v0 first=10 [3]",
                "label 3",
                "return-void"
            ]
        );
    }

    #[test]
    fn fill_array_data_payload() {
        let events = run(
            1,
            &[
                0x0026, // fill-array-data v0
                0x0004, 0x0000, // payload at +4
                0x000e, // return-void
                0x0300, // payload ident
                0x0001, // element width
                0x0004, 0x0000, // size = 4
                0x0201, 0x0403, // data 1 2 3 4
            ],
        );
        assert_eq!(
            events,
            vec![
                "registers 1",
                "fill-array-data v0 Byte([1, 2, 3, 4])",
                "return-void"
            ]
        );
    }

    #[test]
    fn catch_all_handler_seeds_traversal() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_le_bytes()); // registers_size
        data.extend_from_slice(&0u16.to_le_bytes()); // ins_size
        data.extend_from_slice(&0u16.to_le_bytes()); // outs_size
        data.extend_from_slice(&1u16.to_le_bytes()); // tries_size
        data.extend_from_slice(&0u32.to_le_bytes()); // debug_info_off
        data.extend_from_slice(&3u32.to_le_bytes()); // insns_size
        for unit in [0x0012u16, 0x000e, 0x000e] {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        data.extend_from_slice(&0u16.to_le_bytes()); // alignment padding
        data.extend_from_slice(&0u32.to_le_bytes()); // try start_addr
        data.extend_from_slice(&2u16.to_le_bytes()); // try insn_count
        data.extend_from_slice(&1u16.to_le_bytes()); // handler_off
        data.extend_from_slice(&[0x01, 0x00, 0x02]); // one catch-all at +2

        let dex = Dex {
            data,
            ..Dex::default()
        };
        let mut events = Events::default();
        accept_code(&dex, Config::empty(), 0, &method(), true, &mut events).unwrap();

        assert_eq!(
            events.0,
            vec![
                "registers 1",
                "try 0..2 [<any> -> 2]",
                "label 0",
                "const/4 v0 Int(0)",
                "return-void",
                "label 2",
                "return-void"
            ]
        );
    }

    #[test]
    fn out_of_range_jump_is_flagged() {
        // goto +100 with a 2-unit method
        let events = run(1, &[0x6428, 0x000e]);
        assert_eq!(events, vec!["registers 1", "bad 0x28 at 0"]);
    }
}
