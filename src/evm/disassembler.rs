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

use ruint::aliases::U256;

use crate::evm::instruction::Instruction;
use crate::evm::opcode;

/// Byte offsets which Solidity never emits a `JUMPDEST` at; a jump
/// targeting one of them (when not an actual `JUMPDEST`) marks a path
/// the compiler considers unreachable.
const SENTINEL_OFFSETS: [usize; 3] = [0, 2, 7];

/// The result of a linear sweep over raw bytecode: a dense instruction
/// table indexed both by byte offset and by sequential position, the
/// set of valid jump destinations, and the set of opcodes occurring in
/// live (reachable-by-sweep) code.
pub struct Disassembly {
    instructions: Vec<Instruction>,
    by_offset: HashMap<usize, usize>,
    jumpdests: BTreeSet<usize>,
    invalid_jumpdests: BTreeSet<usize>,
    opcodes: HashSet<u16>,
}

impl Disassembly {
    /// Sweep a raw bytecode sequence.  Every byte position which is
    /// not covered by a push immediate yields an instruction; bytes
    /// following a halt or unconditional jump are "dead" until the
    /// next `JUMPDEST` and do not contribute to the opcode-presence
    /// set.  A trailing synthetic `STOP` is appended when the sweep
    /// runs off the end without halting.
    pub fn new(bytecode: &[u8]) -> Self {
        let mut disasm = Disassembly {
            instructions: Vec::new(),
            by_offset: HashMap::new(),
            jumpdests: BTreeSet::new(),
            invalid_jumpdests: BTreeSet::new(),
            opcodes: HashSet::new(),
        };
        let end = bytecode.len();
        let mut offset = 0;
        let mut pc = 0;
        let mut dead = false;
        //
        while offset < end {
            let op = bytecode[offset] as u16;
            if op == opcode::JUMPDEST {
                dead = false;
            }
            let push_data_size = opcode::info(op).map_or(0, |i| i.push_data_size);
            let push_data = read_push_data(bytecode, offset + 1, push_data_size);
            let inst = Instruction::new(offset, pc, op, push_data);
            disasm.add(inst, dead);
            if inst.is_halt_or_unconditional_jump() {
                dead = true;
            }
            offset += 1 + push_data_size;
            pc += 1;
        }
        // Fell off the end without halting
        if !dead {
            disasm.add(Instruction::new(offset, pc, opcode::STOP, None), false);
        }
        // Collect jump destinations
        for inst in &disasm.instructions {
            if inst.opcode == opcode::JUMPDEST {
                disasm.jumpdests.insert(inst.offset);
            }
        }
        for o in SENTINEL_OFFSETS {
            if !disasm.jumpdests.contains(&o) {
                disasm.invalid_jumpdests.insert(o);
            }
        }
        // Done
        disasm
    }

    fn add(&mut self, inst: Instruction, dead: bool) {
        self.by_offset.insert(inst.offset, self.instructions.len());
        self.instructions.push(inst);
        if !dead {
            self.opcodes.insert(inst.opcode);
        }
    }

    pub fn at_pc(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    pub fn at_offset(&self, offset: usize) -> Option<&Instruction> {
        self.by_offset.get(&offset).map(|&pc| &self.instructions[pc])
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_jumpdest(&self, offset: usize) -> bool {
        self.jumpdests.contains(&offset)
    }

    pub fn is_invalid_jumpdest(&self, offset: usize) -> bool {
        self.invalid_jumpdests.contains(&offset)
    }

    pub fn jumpdests(&self) -> &BTreeSet<usize> {
        &self.jumpdests
    }

    /// Whether the given opcode occurs in live code.
    pub fn contains(&self, opcode: u16) -> bool {
        self.opcodes.contains(&opcode)
    }

    pub fn contains_any<F>(&self, pred: F) -> bool
    where
        F: Fn(u16) -> bool,
    {
        self.opcodes.iter().any(|&op| pred(op))
    }
}

/// Read a big-endian push immediate of `size` bytes starting at
/// `offset`, zero-padding on the right when the code is truncated.
fn read_push_data(bytecode: &[u8], offset: usize, size: usize) -> Option<U256> {
    if size == 0 {
        return None;
    }
    let mut buf = [0u8; 32];
    let avail = bytecode.len().saturating_sub(offset).min(size);
    buf[..avail].copy_from_slice(&bytecode[offset..offset + avail]);
    Some(U256::try_from_be_slice(&buf[..size]).unwrap())
}
