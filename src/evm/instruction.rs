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
use std::fmt;

use ruint::aliases::U256;

use crate::evm::opcode::{self, MemAccess};

/// A single disassembled program unit: its byte offset within the
/// code, its sequential index (`pc`), the opcode byte and the
/// immediate operand for the push family.  Immutable after
/// disassembly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instruction {
    pub offset: usize,
    pub pc: usize,
    pub opcode: u16,
    pub push_data: Option<U256>,
}

impl Instruction {
    pub fn new(offset: usize, pc: usize, opcode: u16, push_data: Option<U256>) -> Self {
        Instruction { offset, pc, opcode, push_data }
    }

    /// An unknown opcode terminates the path just like an explicit
    /// halt, hence both count as halting here.
    pub fn is_halt(&self) -> bool {
        opcode::info(self.opcode).is_none() || opcode::is_halt(self.opcode)
    }

    pub fn is_halt_or_unconditional_jump(&self) -> bool {
        self.is_halt() || self.opcode == opcode::JUMP
    }

    pub fn is_push(&self) -> bool {
        opcode::push_arg(self.opcode).is_some()
    }

    pub fn is_arithmetic(&self) -> bool {
        opcode::is_arithmetic(self.opcode)
    }

    pub fn is_call(&self) -> bool {
        opcode::is_call(self.opcode)
    }

    pub fn is_mem_access(&self) -> bool {
        self.mem_read().is_some() || self.mem_write().is_some()
    }

    pub fn is_taint_source(&self) -> bool {
        opcode::is_taint(self.opcode)
    }

    pub fn mem_read(&self) -> Option<MemAccess> {
        opcode::mem_read(self.opcode)
    }

    pub fn mem_write(&self) -> Option<MemAccess> {
        opcode::mem_write(self.opcode)
    }

    /// Number of stack operands consumed (zero for unknown opcodes).
    pub fn pops(&self) -> usize {
        opcode::info(self.opcode).map_or(0, |i| i.pops)
    }

    /// Number of stack results produced (zero for unknown opcodes).
    pub fn pushes(&self) -> usize {
        opcode::info(self.opcode).map_or(0, |i| i.pushes)
    }

    pub fn push_arg(&self) -> Option<usize> {
        opcode::push_arg(self.opcode)
    }

    pub fn dup_arg(&self) -> Option<usize> {
        opcode::dup_arg(self.opcode)
    }

    pub fn swap_arg(&self) -> Option<usize> {
        opcode::swap_arg(self.opcode)
    }

    pub fn name(&self) -> &'static str {
        opcode::name(self.opcode)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.push_data {
            Some(data) => write!(f, "{:05x} {} {:#x}", self.offset, self.name(), data),
            None => write!(f, "{:05x} {}", self.offset, self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::opcode::*;

    #[test]
    fn test_predicates() {
        let push = Instruction::new(0, 0, PUSH1, Some(U256::from(0x80)));
        assert!(push.is_push());
        assert!(!push.is_halt());
        assert_eq!(push.push_arg(), Some(1));
        // Unknown opcodes halt the path
        let garbage = Instruction::new(0, 0, 0x0c, None);
        assert!(garbage.is_halt());
        assert_eq!(garbage.pops(), 0);
        let jump = Instruction::new(0, 0, JUMP, None);
        assert!(jump.is_halt_or_unconditional_jump());
        assert!(!jump.is_halt());
    }

    #[test]
    fn test_display() {
        let push = Instruction::new(11, 3, PUSH1, Some(U256::from(0x1b)));
        assert_eq!(format!("{}", push), "0000b PUSH1 0x1b");
        let stop = Instruction::new(64, 20, STOP, None);
        assert_eq!(format!("{}", stop), "00040 STOP");
    }
}
