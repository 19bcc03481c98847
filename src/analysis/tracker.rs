// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use log::warn;
use ruint::aliases::U256;

use crate::analysis::state::{Image, MemItem, State, StoItem};
use crate::analysis::value::{ValueId, Values};
use crate::evm::{opcode, Disassembly, Instruction};
use crate::util::{to_usize, ToHexString};

/// Bytecode preamble of contracts compiled with a three-slot scratch
/// area (`PUSH1 0x60 PUSH1 0x40 MSTORE`).
const PROLOGUE_60: [u8; 5] = [0x60, 0x60, 0x60, 0x40, 0x52];
/// Bytecode preamble of contracts compiled with a four-slot scratch
/// area (`PUSH1 0x80 PUSH1 0x40 MSTORE`).
const PROLOGUE_80: [u8; 5] = [0x60, 0x80, 0x60, 0x40, 0x52];

// ============================================================================
// Error
// ============================================================================

/// An error which arises when constructing a tracker over bytecode
/// the analysis cannot model.
pub enum Error {
    /// The bytecode does not begin with either recognised
    /// free-memory-pointer preamble.
    UnsupportedPrologue(Vec<u8>),
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnsupportedPrologue(header) => {
                write!(f, "unsupported bytecode prologue {}", header.to_hex_string())
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Just reuse debug formatting.
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Tracker
// ============================================================================

/// The abstract interpreter for one analysis phase.  For every
/// executed instruction it produces a symbolic value and applies five
/// transfers in order: stack discipline, code/calldata/returndata
/// specials, the arena-partitioned memory model, storage, and taint
/// propagation.
pub struct Tracker {
    pub values: Values,
    pub state: State,
    images: HashMap<usize, HashSet<Image>>,
    inst2sn: HashMap<usize, u32>,
    step: u32,
    pub last_call: Option<ValueId>,
}

impl Tracker {
    /// Construct a tracker for the given phase.  The scratch-area
    /// width is read off the bytecode preamble; `seeds` primes the
    /// symbolic storage for phase two.
    pub fn new(
        bytecode: &[u8],
        step: u32,
        values: Values,
        seeds: &[StoItem],
    ) -> Result<Self, Error> {
        let mem_head_len = if bytecode.starts_with(&PROLOGUE_60) {
            3
        } else if bytecode.starts_with(&PROLOGUE_80) {
            4
        } else {
            let n = bytecode.len().min(5);
            return Err(Error::UnsupportedPrologue(bytecode[..n].to_vec()));
        };
        let mut state = State::new(mem_head_len);
        state.sto.extend_from_slice(seeds);
        Ok(Tracker {
            values,
            state,
            images: HashMap::new(),
            inst2sn: HashMap::new(),
            step,
            last_call: None,
        })
    }

    /// Release the value arena, so a later phase can keep resolving
    /// ids recorded during this one.
    pub fn into_values(self) -> Values {
        self.values
    }

    /// Record the stack image for a basic-block entry.  Returns false
    /// when an equivalent image was already seen at this offset, in
    /// which case the block need not be re-explored.
    pub fn visit(&mut self, offset: usize) -> bool {
        let image = Image::new(&self.values, &self.state.stk);
        let seen = self.images.entry(offset).or_default();
        if seen.contains(&image) {
            false
        } else {
            seen.insert(image);
            true
        }
    }

    /// Execute one instruction symbolically.  Returns `None` when the
    /// current path should be abandoned (benign revert shapes, stack
    /// underflow, unmodelled memory).
    pub fn update(
        &mut self,
        bytecode: &[u8],
        disasm: &Disassembly,
        inst: &Instruction,
    ) -> Option<ValueId> {
        let sn = {
            let counter = self.inst2sn.entry(inst.offset).or_insert(0);
            let sn = *counter;
            *counter += 1;
            sn
        };
        let id = self.values.alloc(*inst, sn, self.step);
        self.state.trace.push(id);
        if !self.update_stk(id, disasm) {
            warn!("stack underflow at {}", inst);
            return None;
        }
        self.update_special(id, bytecode);
        if !self.update_mem(id) {
            return None;
        }
        self.update_sto(id);
        self.update_taint(id);

        if inst.is_call() {
            // The pushed result of a call is opaque to later code
            let unknown = self.values.duplicate(id);
            *self.state.stk.last_mut().unwrap() = unknown;
            self.last_call = Some(id);
        }
        Some(id)
    }

    /// Stack discipline: pushes carry their immediate, duplicates
    /// share the duplicated value, everything else pops its declared
    /// arity (top first) and attempts constant folding.
    fn update_stk(&mut self, id: ValueId, disasm: &Disassembly) -> bool {
        let inst = self.values.get(id).inst;
        if inst.is_push() {
            let data = inst.push_data.expect("push instruction without immediate");
            self.values.get_mut(id).value = Some(data);
            if let Some(target) = to_usize(data) {
                if disasm.is_jumpdest(target) {
                    self.values.get_mut(id).push_offset = Some(inst.offset);
                }
            }
            self.state.stk.push(id);
        } else if let Some(n) = inst.dup_arg() {
            let len = self.state.stk.len();
            if len < n {
                return false;
            }
            let dup = self.state.stk[len - n];
            self.state.stk.push(dup);
        } else if let Some(n) = inst.swap_arg() {
            let len = self.state.stk.len();
            if len < n + 1 {
                return false;
            }
            self.state.stk.swap(len - 1, len - 1 - n);
        } else {
            let pops = inst.pops();
            if self.state.stk.len() < pops {
                return false;
            }
            let mut operands = Vec::with_capacity(pops);
            for _ in 0..pops {
                operands.push(self.state.stk.pop().unwrap());
            }
            self.values.get_mut(id).stack_operands = operands;
            self.values.calculate(id);
            if inst.pushes() > 0 {
                self.state.stk.push(id);
            }
        }
        true
    }

    /// Code / calldata / returndata specials: sizes and copies whose
    /// result is statically known.
    fn update_special(&mut self, id: ValueId, bytecode: &[u8]) {
        let inst = self.values.get(id).inst;
        match inst.opcode {
            opcode::CODESIZE => {
                self.values.get_mut(id).value = Some(U256::from(bytecode.len()));
            }
            opcode::CODECOPY => {
                let ops = self.values.get(id).stack_operands.clone();
                let src_origin = self.values.origin(ops[1]);
                if self.values.get(src_origin).inst.opcode == opcode::CODESIZE {
                    self.values.get_mut(id).value = Some(U256::ZERO);
                } else if let (Some(start), Some(length)) =
                    (self.values.get(ops[1]).value, self.values.get(ops[2]).value)
                {
                    let start = to_usize(start).expect("code offset out of range");
                    let length = to_usize(length).expect("code length out of range");
                    assert!(
                        start < start + length && start + length <= bytecode.len(),
                        "CODECOPY beyond end of code ({:#x}+{:#x})",
                        start,
                        length
                    );
                    let slice = &bytecode[start..start + length];
                    // canonical 256-bit storage: keep the low words
                    let tail = if slice.len() > 32 { &slice[slice.len() - 32..] } else { slice };
                    self.values.get_mut(id).value = U256::try_from_be_slice(tail);
                }
            }
            opcode::CALLDATALOAD | opcode::CALLDATACOPY => {
                let index = if inst.opcode == opcode::CALLDATALOAD { 0 } else { 1 };
                let start = self.values.get(id).stack_operands[index];
                let origin = self.values.origin(start);
                if self.values.get(origin).inst.opcode == opcode::CALLDATASIZE {
                    self.values.get_mut(id).value = Some(U256::ZERO);
                }
            }
            _ => {}
        }
    }

    /// The memory model.  Writes are partitioned into arenas indexed
    /// by the succession of stores to the free-memory pointer at
    /// 0x40; reads resolve against the scratch head or the arena
    /// their offset derives from.  Returns false to abandon the path
    /// on recognised benign shapes (revert data construction,
    /// returndata copies) and on unmodelled situations.
    fn update_mem(&mut self, id: ValueId) -> bool {
        let inst = self.values.get(id).inst;

        if inst.opcode == opcode::MSIZE {
            match self.state.fmps.last().copied() {
                Some(fmp) => self.values.alias_value(id, fmp),
                None => {
                    warn!("MSIZE before any free-memory frame at {}", inst);
                    return false;
                }
            }
        }
        if !inst.is_mem_access() {
            return true;
        }

        if inst.mem_read().is_some() && !is_outbound(inst.opcode) {
            if !self.read_mem(id, inst) {
                return false;
            }
        }
        // an opcode may both read and write memory
        if inst.mem_write().is_some() {
            if !self.write_mem(id, inst) {
                return false;
            }
        }
        true
    }

    fn read_mem(&mut self, id: ValueId, inst: Instruction) -> bool {
        let start = self.values.mem_start(id, true);
        let length_raw = self.values.mem_length(id, true);
        let length = self.values.origin(length_raw);
        if self.values.get(length).value == Some(U256::ZERO) {
            return true;
        }
        let start_val = self.values.get(start).value;
        let head_limit = self.state.mem_head_len() * 0x20;
        let start_slot = start_val
            .and_then(to_usize)
            .filter(|&s| s < head_limit && s % 0x20 == 0);

        if let (opcode::MLOAD, Some(slot)) = (inst.opcode, start_slot) {
            // read of a scratch / fmp cell
            let index = slot / 0x20;
            if self.state.mem_head[index].is_none() {
                let value = self.values.intern(U256::ZERO);
                let slot = self.values.intern(U256::from(index));
                let width = self.values.intern(U256::from(32));
                self.state.mem_head[index] = Some(MemItem { value, start: slot, length: width });
            }
            let item = self.state.mem_head[index].unwrap();
            self.values.get_mut(id).mem_operands = vec![item];
            self.values.alias_value(id, item.value);
        } else if inst.opcode == opcode::SHA3 && start_val == Some(U256::ZERO) {
            let width = self.values.get(length).value;
            assert!(
                width == Some(U256::from(0x20)) || width == Some(U256::from(0x40)),
                "unexpected scratch hash width at {}",
                inst
            );
            let slots = if width == Some(U256::from(0x20)) { 1 } else { 2 };
            let items: Vec<MemItem> = self.state.mem_head[..slots]
                .iter()
                .copied()
                .map(|slot| slot.expect("scratch slot hashed before first write"))
                .collect();
            self.values.get_mut(id).mem_operands = items;
        } else if self.is_read_60_data(id, start) {
            // compiler idiom: load of the constant cell above the
            // four-slot scratch area; nothing to bind
        } else if let Some(index) = self.find_mem_index(start) {
            if inst.opcode == opcode::MLOAD {
                let start_uid = self.values.get(start).uid;
                for item in self.state.mem[index].clone().iter().rev() {
                    let item_start = self.values.get(item.start);
                    let same_id = item_start.uid == start_uid;
                    let same_value = item_start.value.is_some()
                        && start_val.is_some()
                        && item_start.value == start_val;
                    if same_id || same_value {
                        if self.values.get(item.length).value == Some(U256::from(0x20)) {
                            self.values.get_mut(id).mem_operands = vec![*item];
                            self.values.alias_value(id, item.value);
                        }
                        break;
                    }
                }
            } else {
                self.values.get_mut(id).mem_operands = self.state.mem[index].clone();
            }
            if inst.is_call() {
                let kind = self.values.get(self.values.get(id).stack_operands[1]).value;
                if kind == Some(U256::from(4)) {
                    // the identity precompile leaves its input intact
                } else {
                    self.state.mem[index].clear();
                }
            }
        }
        true
    }

    fn write_mem(&mut self, id: ValueId, inst: Instruction) -> bool {
        if matches!(inst.opcode, opcode::MSTORE | opcode::MSTORE8) {
            let written = self.values.get(id).stack_operands[1];
            self.values.alias_value(id, written);
        }
        let start = self.values.mem_start(id, false);
        let length_raw = self.values.mem_length(id, false);
        let length = self.values.origin(length_raw);
        if self.values.get(length).value == Some(U256::ZERO) {
            return true;
        }
        let start_val = self.values.get(start).value;
        let head_limit = self.state.mem_head_len() * 0x20;

        if let Some(offset) = start_val.and_then(to_usize).filter(|&s| s < head_limit) {
            // a write into the scratch / fmp area
            if self.is_returndata_copy(id)
                || self.is_revert_panic_or_error(id)
                || self.is_return_subcall(id)
            {
                return false;
            }
            let width = self.values.get(length).value;
            assert!(
                inst.opcode == opcode::MSTORE
                    || (inst.opcode == opcode::CODECOPY
                        && start_val == Some(U256::ZERO)
                        && width == Some(U256::from(0x20))),
                "unsupported scratch write {}",
                inst
            );
            if offset % 0x20 != 0 {
                return false;
            }
            let index = offset / 0x20;
            let slot = self.values.intern(U256::from(index));
            let word = self.values.intern(U256::from(0x20));
            self.state.mem_head[index] = Some(MemItem { value: id, start: slot, length: word });
            if offset == 0x40 {
                assert_eq!(inst.opcode, opcode::MSTORE, "free-memory pointer not MSTOREd");
                let fmp = self.values.origin(self.values.get(id).stack_operands[1]);
                self.state.fmps.push(fmp);
                self.state.fmpids.push(self.values.get(fmp).uid);
                self.state.mem.push(Vec::new());
            }
        } else if inst.opcode == opcode::MSTORE
            && self.values.get(self.values.get(id).stack_operands[0]).inst.opcode == opcode::MSIZE
        {
            // a store at the memory frontier starts the frame over
            if self.state.fmps.is_empty() {
                warn!("MSIZE store before any free-memory frame at {}", inst);
                return false;
            }
            let index = self.state.fmps.len() - 1;
            self.state.mem[index] = vec![MemItem { value: id, start, length }];
        } else if let Some(index) = self.find_mem_index(start) {
            // drop writes this one dominates
            let start_uid = self.values.get(start).uid;
            let new_width = self.values.get(length).value;
            let kept: Vec<MemItem> = self.state.mem[index]
                .iter()
                .copied()
                .filter(|item| {
                    let old_width = self.values.get(item.length).value;
                    let dominated = self.values.get(item.start).uid == start_uid
                        && matches!((old_width, new_width), (Some(old), Some(new)) if old <= new);
                    !dominated
                })
                .collect();
            self.state.mem[index] = kept;
            self.state.mem[index].push(MemItem { value: id, start, length });
        }
        true
    }

    /// `RETURNDATACOPY 0 0 RETURNDATASIZE`: a full copy of a
    /// subcall's return data into scratch, emitted when bubbling a
    /// result up.
    fn is_returndata_copy(&self, id: ValueId) -> bool {
        let node = self.values.get(id);
        if node.inst.opcode != opcode::RETURNDATACOPY {
            return false;
        }
        let dst = self.values.get(node.stack_operands[0]).value;
        let src = self.values.get(node.stack_operands[1]).value;
        let len_origin = self.values.origin(node.stack_operands[2]);
        dst == Some(U256::ZERO)
            && src == Some(U256::ZERO)
            && self.values.get(len_origin).inst.opcode == opcode::RETURNDATASIZE
    }

    /// An `MSTORE` at 0x04 following a store of the solidity
    /// `Panic(uint256)` or `Error(string)` selector at 0x00: revert
    /// data construction.
    fn is_revert_panic_or_error(&self, id: ValueId) -> bool {
        let node = self.values.get(id);
        if node.inst.opcode != opcode::MSTORE {
            return false;
        }
        if self.values.get(node.stack_operands[0]).value != Some(U256::from(4)) {
            return false;
        }
        let head = match self.state.mem_head[0] {
            Some(item) => item,
            None => return false,
        };
        let writer = self.values.get(head.value);
        if writer.inst.opcode != opcode::MSTORE {
            return false;
        }
        let selector = self.values.get(writer.stack_operands[1]).value;
        let panic = U256::from(0x4e48_7b71u64) << 0xe0usize;
        let error = U256::from(0x08c3_79a0u64) << 0xe0usize;
        selector == Some(panic) || selector == Some(error)
    }

    /// `RETURNDATACOPY 0 0 4`: copying a subcall's selector-sized
    /// result ahead of returning it.
    fn is_return_subcall(&self, id: ValueId) -> bool {
        let node = self.values.get(id);
        if node.inst.opcode != opcode::RETURNDATACOPY {
            return false;
        }
        self.values.get(node.stack_operands[0]).value == Some(U256::ZERO)
            && self.values.get(node.stack_operands[1]).value == Some(U256::ZERO)
            && self.values.get(node.stack_operands[2]).value == Some(U256::from(4))
    }

    /// `MLOAD(ADD(PUSH1 0x20, PUSH1 0x60))` under the four-slot
    /// preamble: a load of the word just above the scratch area.
    fn is_read_60_data(&self, id: ValueId, start: ValueId) -> bool {
        if self.state.mem_head_len() != 4 {
            return false;
        }
        let node = self.values.get(id);
        if node.inst.opcode != opcode::MLOAD {
            return false;
        }
        let start_node = self.values.get(start);
        if start_node.inst.opcode != opcode::ADD {
            return false;
        }
        if start_node.value != Some(U256::from(0x80)) {
            return false;
        }
        let a = self.values.get(start_node.stack_operands[0]);
        let b = self.values.get(start_node.stack_operands[1]);
        a.value == Some(U256::from(0x20))
            && b.value == Some(U256::from(0x60))
            && a.inst.opcode == opcode::PUSH1
            && b.inst.opcode == opcode::PUSH1
    }

    /// Identify which free-memory frame an offset expression refers
    /// to, recognising the algebraic shapes the compiler emits for
    /// "the current frame".
    fn find_mem_index(&self, id: ValueId) -> Option<usize> {
        let index = self.find_mem_index_dfs(id);
        if index.is_none() {
            warn!("mem_index not found!");
        }
        index
    }

    fn find_mem_index_dfs(&self, id: ValueId) -> Option<usize> {
        let origin = self.values.origin(id);
        if origin != id {
            return self.find_mem_index_dfs(origin);
        }
        let uid = self.values.get(id).uid;
        if let Some(index) = self.state.fmpids.iter().position(|&x| x == uid) {
            return Some(index);
        }
        let node = self.values.get(id);
        match node.inst.opcode {
            opcode::ADD | opcode::AND => {
                let a = node.stack_operands[0];
                let b = node.stack_operands[1];
                self.find_mem_index_dfs(a).or_else(|| self.find_mem_index_dfs(b))
            }
            opcode::SUB => {
                let x0 = node.stack_operands[0];
                let x1 = node.stack_operands[1];
                // new_fmp - 0x20 names the previous frame, provided
                // new_fmp really was previous + 0x20
                if self.values.get(x1).value == Some(U256::from(0x20)) {
                    let x0_uid = self.values.get(self.values.origin(x0)).uid;
                    if let Some(pos) = self.state.fmpids.iter().position(|&x| x == x0_uid) {
                        assert!(pos >= 1, "frame pointer has no predecessor");
                        let index = pos - 1;
                        let cur_fmp = self.state.fmps[index];
                        let next_fmp = self.state.fmps[index + 1];
                        let next_node = self.values.get(next_fmp);
                        assert_eq!(
                            next_node.inst.opcode,
                            opcode::ADD,
                            "successor frame pointer not derived by ADD"
                        );
                        let a = self.values.origin(next_node.stack_operands[0]);
                        let b = self.values.origin(next_node.stack_operands[1]);
                        let cur_uid = self.values.get(cur_fmp).uid;
                        let word = Some(U256::from(0x20));
                        assert!(
                            (self.values.get(a).value == word
                                && self.values.get(b).uid == cur_uid)
                                || (self.values.get(b).value == word
                                    && self.values.get(a).uid == cur_uid),
                            "successor frame pointer not previous + 0x20"
                        );
                        return Some(index);
                    }
                }
                // word alignment: (y + z) - (y & 0x1f) indexes like z
                let n0 = self.values.get(x0);
                let n1 = self.values.get(x1);
                if n0.inst.opcode == opcode::ADD && n1.inst.opcode == opcode::AND {
                    let x00 = n0.stack_operands[0];
                    let x01 = n0.stack_operands[1];
                    let x10 = n1.stack_operands[0];
                    let x11 = n1.stack_operands[1];
                    if self.values.get(x10).value == Some(U256::from(0x1f))
                        && self.values.get(x00).uid == self.values.get(x11).uid
                    {
                        return self.find_mem_index_dfs(x01);
                    }
                }
                None
            }
            opcode::MLOAD => self.find_mem_index_dfs(node.stack_operands[0]),
            _ => None,
        }
    }

    /// Storage: loads scan the path's writes (most recent first) for
    /// a polynomial-equal key and alias to the stored value; stores
    /// append.
    fn update_sto(&mut self, id: ValueId) {
        let inst = self.values.get(id).inst;
        if inst.opcode == opcode::SLOAD {
            let key = self.values.origin(self.values.get(id).stack_operands[0]);
            let key_poly = self.values.polynomial(key);
            for i in (0..self.state.sto.len()).rev() {
                let item = self.state.sto[i];
                let item_poly = self.values.polynomial(item.key);
                if key_poly.eq(&item_poly).unwrap_or(false) {
                    self.values.get_mut(id).sto_operands.push(item.value);
                    let stored = self.values.origin(item.value);
                    self.values.alias_value(id, stored);
                    break;
                }
            }
        } else if inst.opcode == opcode::SSTORE {
            let written = self.values.get(id).stack_operands[1];
            self.values.alias_value(id, written);
            let key = self.values.origin(self.values.get(id).stack_operands[0]);
            self.state.sto.push(StoItem { key, value: id });
        }
    }

    /// Taint: union over every operand (stack, memory writer + start
    /// + length, storage), plus the instruction itself when it is a
    /// source, plus the synthetic MOD_TIME marker when a time source
    /// meets a modulo.
    fn update_taint(&mut self, id: ValueId) {
        let (inst, stack_ops, mem_ops, sto_ops) = {
            let node = self.values.get(id);
            (
                node.inst,
                node.stack_operands.clone(),
                node.mem_operands.clone(),
                node.sto_operands.clone(),
            )
        };
        let mut taint: BTreeSet<u16> = BTreeSet::new();
        for op in stack_ops {
            taint.extend(self.values.get(op).taint.iter().copied());
        }
        for item in mem_ops {
            taint.extend(self.values.get(item.value).taint.iter().copied());
            taint.extend(self.values.get(item.start).taint.iter().copied());
            taint.extend(self.values.get(item.length).taint.iter().copied());
        }
        for op in sto_ops {
            taint.extend(self.values.get(op).taint.iter().copied());
        }
        if inst.is_taint_source() {
            taint.insert(inst.opcode);
        } else if opcode::is_mod(inst.opcode) && taint.iter().any(|&t| opcode::is_time(t)) {
            taint.insert(opcode::MOD_TIME);
        }
        self.values.get_mut(id).taint = taint;
    }
}

/// Reads performed only to ship data out of the contract; their
/// contents never influence control flow.
fn is_outbound(op: u16) -> bool {
    matches!(op, opcode::RETURN | opcode::REVERT | opcode::LOG0..=opcode::LOG4)
}
