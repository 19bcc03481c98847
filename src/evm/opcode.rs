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

//! Static opcode metadata.  Opcodes are held as `u16` rather than `u8`
//! so that the two synthetic markers sitting above the byte range
//! (`MOD_TIME`, `SPECIAL_VALUE`) share the same namespace as the real
//! instruction set.

// 0s: Stop and Arithmetic Operations
pub const STOP: u16 = 0x00;
pub const ADD: u16 = 0x01;
pub const MUL: u16 = 0x02;
pub const SUB: u16 = 0x03;
pub const DIV: u16 = 0x04;
pub const SDIV: u16 = 0x05;
pub const MOD: u16 = 0x06;
pub const SMOD: u16 = 0x07;
pub const ADDMOD: u16 = 0x08;
pub const MULMOD: u16 = 0x09;
pub const EXP: u16 = 0x0a;
pub const SIGNEXTEND: u16 = 0x0b;
// 10s: Comparison & Bitwise Logic Operations
pub const LT: u16 = 0x10;
pub const GT: u16 = 0x11;
pub const SLT: u16 = 0x12;
pub const SGT: u16 = 0x13;
pub const EQ: u16 = 0x14;
pub const ISZERO: u16 = 0x15;
pub const AND: u16 = 0x16;
pub const OR: u16 = 0x17;
pub const XOR: u16 = 0x18;
pub const NOT: u16 = 0x19;
pub const BYTE: u16 = 0x1a;
pub const SHL: u16 = 0x1b;
pub const SHR: u16 = 0x1c;
pub const SAR: u16 = 0x1d;
// 20s: Keccak256
pub const SHA3: u16 = 0x20;
// 30s: Environment Information
pub const ADDRESS: u16 = 0x30;
pub const BALANCE: u16 = 0x31;
pub const ORIGIN: u16 = 0x32;
pub const CALLER: u16 = 0x33;
pub const CALLVALUE: u16 = 0x34;
pub const CALLDATALOAD: u16 = 0x35;
pub const CALLDATASIZE: u16 = 0x36;
pub const CALLDATACOPY: u16 = 0x37;
pub const CODESIZE: u16 = 0x38;
pub const CODECOPY: u16 = 0x39;
pub const GASPRICE: u16 = 0x3a;
pub const EXTCODESIZE: u16 = 0x3b;
pub const EXTCODECOPY: u16 = 0x3c;
pub const RETURNDATASIZE: u16 = 0x3d;
pub const RETURNDATACOPY: u16 = 0x3e;
pub const EXTCODEHASH: u16 = 0x3f;
// 40s: Block Information
pub const BLOCKHASH: u16 = 0x40;
pub const COINBASE: u16 = 0x41;
pub const TIMESTAMP: u16 = 0x42;
pub const NUMBER: u16 = 0x43;
pub const DIFFICULTY: u16 = 0x44;
pub const GASLIMIT: u16 = 0x45;
pub const CHAINID: u16 = 0x46;
pub const SELFBALANCE: u16 = 0x47;
pub const BASEFEE: u16 = 0x48;
// 50s: Stack, Memory, Storage and Flow Operations
pub const POP: u16 = 0x50;
pub const MLOAD: u16 = 0x51;
pub const MSTORE: u16 = 0x52;
pub const MSTORE8: u16 = 0x53;
pub const SLOAD: u16 = 0x54;
pub const SSTORE: u16 = 0x55;
pub const JUMP: u16 = 0x56;
pub const JUMPI: u16 = 0x57;
pub const PC: u16 = 0x58;
pub const MSIZE: u16 = 0x59;
pub const GAS: u16 = 0x5a;
pub const JUMPDEST: u16 = 0x5b;
// 60s & 70s: Push Operations
pub const PUSH1: u16 = 0x60;
pub const PUSH32: u16 = 0x7f;
// 80s: Duplication Operations
pub const DUP1: u16 = 0x80;
pub const DUP16: u16 = 0x8f;
// 90s: Swap Operations
pub const SWAP1: u16 = 0x90;
pub const SWAP16: u16 = 0x9f;
// a0s: Log Operations
pub const LOG0: u16 = 0xa0;
pub const LOG4: u16 = 0xa4;
// f0s: System Operations
pub const CREATE: u16 = 0xf0;
pub const CALL: u16 = 0xf1;
pub const CALLCODE: u16 = 0xf2;
pub const RETURN: u16 = 0xf3;
pub const DELEGATECALL: u16 = 0xf4;
pub const CREATE2: u16 = 0xf5;
pub const STATICCALL: u16 = 0xfa;
pub const REVERT: u16 = 0xfd;
pub const INVALID: u16 = 0xfe;
pub const SELFDESTRUCT: u16 = 0xff;
// Synthetic markers (never emitted by the disassembler).  `MOD_TIME`
// records "a time-derived value flowed through a modulo" in taint
// sets; `SPECIAL_VALUE` is the producing instruction of interned
// constants.
pub const MOD_TIME: u16 = 0x100;
pub const SPECIAL_VALUE: u16 = 0x101;

/// Static metadata for a single opcode: mnemonic, number of immediate
/// bytes, stack arity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OpcodeInfo {
    pub name: &'static str,
    pub push_data_size: usize,
    pub pops: usize,
    pub pushes: usize,
}

const fn op(name: &'static str, push_data_size: usize, pops: usize, pushes: usize) -> OpcodeInfo {
    OpcodeInfo { name, push_data_size, pops, pushes }
}

/// Lookup the metadata for a given opcode, or `None` if the byte does
/// not correspond to a known instruction.
pub fn info(opcode: u16) -> Option<OpcodeInfo> {
    let i = match opcode {
        STOP => op("STOP", 0, 0, 0),
        ADD => op("ADD", 0, 2, 1),
        MUL => op("MUL", 0, 2, 1),
        SUB => op("SUB", 0, 2, 1),
        DIV => op("DIV", 0, 2, 1),
        SDIV => op("SDIV", 0, 2, 1),
        MOD => op("MOD", 0, 2, 1),
        SMOD => op("SMOD", 0, 2, 1),
        ADDMOD => op("ADDMOD", 0, 3, 1),
        MULMOD => op("MULMOD", 0, 3, 1),
        EXP => op("EXP", 0, 2, 1),
        SIGNEXTEND => op("SIGNEXTEND", 0, 2, 1),
        LT => op("LT", 0, 2, 1),
        GT => op("GT", 0, 2, 1),
        SLT => op("SLT", 0, 2, 1),
        SGT => op("SGT", 0, 2, 1),
        EQ => op("EQ", 0, 2, 1),
        ISZERO => op("ISZERO", 0, 1, 1),
        AND => op("AND", 0, 2, 1),
        OR => op("OR", 0, 2, 1),
        XOR => op("XOR", 0, 2, 1),
        NOT => op("NOT", 0, 1, 1),
        BYTE => op("BYTE", 0, 2, 1),
        SHL => op("SHL", 0, 2, 1),
        SHR => op("SHR", 0, 2, 1),
        SAR => op("SAR", 0, 2, 1),
        SHA3 => op("SHA3", 0, 2, 1),
        ADDRESS => op("ADDRESS", 0, 0, 1),
        BALANCE => op("BALANCE", 0, 1, 1),
        ORIGIN => op("ORIGIN", 0, 0, 1),
        CALLER => op("CALLER", 0, 0, 1),
        CALLVALUE => op("CALLVALUE", 0, 0, 1),
        CALLDATALOAD => op("CALLDATALOAD", 0, 1, 1),
        CALLDATASIZE => op("CALLDATASIZE", 0, 0, 1),
        CALLDATACOPY => op("CALLDATACOPY", 0, 3, 0),
        CODESIZE => op("CODESIZE", 0, 0, 1),
        CODECOPY => op("CODECOPY", 0, 3, 0),
        GASPRICE => op("GASPRICE", 0, 0, 1),
        EXTCODESIZE => op("EXTCODESIZE", 0, 1, 1),
        EXTCODECOPY => op("EXTCODECOPY", 0, 4, 0),
        RETURNDATASIZE => op("RETURNDATASIZE", 0, 0, 1),
        RETURNDATACOPY => op("RETURNDATACOPY", 0, 3, 0),
        EXTCODEHASH => op("EXTCODEHASH", 0, 1, 1),
        BLOCKHASH => op("BLOCKHASH", 0, 1, 1),
        COINBASE => op("COINBASE", 0, 0, 1),
        TIMESTAMP => op("TIMESTAMP", 0, 0, 1),
        NUMBER => op("NUMBER", 0, 0, 1),
        DIFFICULTY => op("DIFFICULTY", 0, 0, 1),
        GASLIMIT => op("GASLIMIT", 0, 0, 1),
        CHAINID => op("CHAINID", 0, 0, 1),
        SELFBALANCE => op("SELFBALANCE", 0, 0, 1),
        BASEFEE => op("BASEFEE", 0, 0, 1),
        POP => op("POP", 0, 1, 0),
        MLOAD => op("MLOAD", 0, 1, 1),
        MSTORE => op("MSTORE", 0, 2, 0),
        MSTORE8 => op("MSTORE8", 0, 2, 0),
        SLOAD => op("SLOAD", 0, 1, 1),
        SSTORE => op("SSTORE", 0, 2, 0),
        JUMP => op("JUMP", 0, 1, 0),
        JUMPI => op("JUMPI", 0, 2, 0),
        PC => op("PC", 0, 0, 1),
        MSIZE => op("MSIZE", 0, 0, 1),
        GAS => op("GAS", 0, 0, 1),
        JUMPDEST => op("JUMPDEST", 0, 0, 0),
        PUSH1..=PUSH32 => {
            let n = (opcode - PUSH1 + 1) as usize;
            OpcodeInfo { name: push_name(opcode), push_data_size: n, pops: 0, pushes: 1 }
        }
        DUP1..=DUP16 => {
            let n = (opcode - DUP1 + 1) as usize;
            OpcodeInfo { name: dup_name(opcode), push_data_size: 0, pops: n, pushes: n + 1 }
        }
        SWAP1..=SWAP16 => {
            let n = (opcode - SWAP1 + 1) as usize;
            OpcodeInfo { name: swap_name(opcode), push_data_size: 0, pops: n + 1, pushes: n + 1 }
        }
        LOG0..=LOG4 => {
            let n = (opcode - LOG0) as usize;
            OpcodeInfo { name: log_name(opcode), push_data_size: 0, pops: n + 2, pushes: 0 }
        }
        CREATE => op("CREATE", 0, 3, 1),
        CALL => op("CALL", 0, 7, 1),
        CALLCODE => op("CALLCODE", 0, 7, 1),
        RETURN => op("RETURN", 0, 2, 0),
        DELEGATECALL => op("DELEGATECALL", 0, 6, 1),
        CREATE2 => op("CREATE2", 0, 4, 1),
        STATICCALL => op("STATICCALL", 0, 6, 1),
        REVERT => op("REVERT", 0, 2, 0),
        INVALID => op("INVALID", 0, 0, 0),
        SELFDESTRUCT => op("SELFDESTRUCT", 0, 1, 0),
        _ => return None,
    };
    Some(i)
}

/// Describes which stack operands of a memory-accessing instruction
/// carry the byte offset and length of the access.  Instructions with
/// an intrinsic width (`MLOAD`, `MSTORE`, `MSTORE8`) have no length
/// operand and carry a fixed length instead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemAccess {
    /// Index (top first) of the stack operand holding the start offset.
    pub start_index: usize,
    /// Index of the stack operand holding the length, if any.
    pub length_index: Option<usize>,
    /// Hard-coded access width in bytes, if the opcode implies one.
    pub fixed_length: Option<u64>,
}

const fn mem(start_index: usize, length_index: usize) -> MemAccess {
    MemAccess { start_index, length_index: Some(length_index), fixed_length: None }
}

const fn mem_fixed(start_index: usize, fixed_length: u64) -> MemAccess {
    MemAccess { start_index, length_index: None, fixed_length: Some(fixed_length) }
}

/// The memory region read by a given opcode, if it reads one.
pub fn mem_read(opcode: u16) -> Option<MemAccess> {
    let m = match opcode {
        SHA3 => mem(0, 1),
        MLOAD => mem_fixed(0, 32),
        CREATE | CREATE2 => mem(1, 2),
        RETURN | REVERT => mem(0, 1),
        LOG0..=LOG4 => mem(0, 1),
        CALL | CALLCODE => mem(3, 4),
        DELEGATECALL | STATICCALL => mem(2, 3),
        _ => return None,
    };
    Some(m)
}

/// The memory region written by a given opcode, if it writes one.
pub fn mem_write(opcode: u16) -> Option<MemAccess> {
    let m = match opcode {
        CALLDATACOPY | CODECOPY | RETURNDATACOPY => mem(0, 2),
        EXTCODECOPY => mem(1, 3),
        MSTORE => mem_fixed(0, 32),
        MSTORE8 => mem_fixed(0, 8),
        CALL | CALLCODE => mem(5, 6),
        DELEGATECALL | STATICCALL => mem(4, 5),
        _ => return None,
    };
    Some(m)
}

/// Immediate size of a push opcode, or `None` for anything else.
pub fn push_arg(opcode: u16) -> Option<usize> {
    match opcode {
        PUSH1..=PUSH32 => Some((opcode - PUSH1 + 1) as usize),
        _ => None,
    }
}

/// Depth argument of a duplication opcode (`DUP1` is 1).
pub fn dup_arg(opcode: u16) -> Option<usize> {
    match opcode {
        DUP1..=DUP16 => Some((opcode - DUP1 + 1) as usize),
        _ => None,
    }
}

/// Depth argument of a swap opcode (`SWAP1` is 1).
pub fn swap_arg(opcode: u16) -> Option<usize> {
    match opcode {
        SWAP1..=SWAP16 => Some((opcode - SWAP1 + 1) as usize),
        _ => None,
    }
}

/// Opcodes which halt execution of the current path.
pub fn is_halt(opcode: u16) -> bool {
    matches!(opcode, STOP | RETURN | REVERT | INVALID | SELFDESTRUCT)
}

/// The purely arithmetic / logical opcodes.
pub fn is_arithmetic(opcode: u16) -> bool {
    matches!(opcode, ADD..=SIGNEXTEND | LT..=SAR)
}

/// The message-call family.
pub fn is_call(opcode: u16) -> bool {
    matches!(opcode, CALL | CALLCODE | DELEGATECALL | STATICCALL)
}

/// Binary operations for which operand order is irrelevant.
pub fn is_commutative(opcode: u16) -> bool {
    matches!(opcode, ADD | MUL | AND | OR | XOR)
}

/// Block-introspection opcodes whose value is block-chosen and hence
/// unpredictable to (or manipulable against) a contract, plus the
/// synthetic time-modulo marker.
pub fn is_special(opcode: u16) -> bool {
    matches!(opcode, BLOCKHASH | COINBASE | DIFFICULTY | GASLIMIT | MOD_TIME)
}

/// Opcodes through which the transaction sender influences a value.
pub fn is_caller(opcode: u16) -> bool {
    matches!(opcode, CALLER | ORIGIN | CALLDATALOAD | CALLDATACOPY)
}

/// Opcodes yielding a monotone block clock.
pub fn is_time(opcode: u16) -> bool {
    matches!(opcode, TIMESTAMP | NUMBER)
}

/// The modulo family, which turns a time source into a "random" value.
pub fn is_mod(opcode: u16) -> bool {
    matches!(opcode, MOD | SMOD | ADDMOD | MULMOD)
}

/// Every opcode which seeds a taint set by itself.
pub fn is_taint(opcode: u16) -> bool {
    is_special(opcode) || is_caller(opcode) || is_time(opcode)
}

fn push_name(opcode: u16) -> &'static str {
    const NAMES: [&str; 32] = [
        "PUSH1", "PUSH2", "PUSH3", "PUSH4", "PUSH5", "PUSH6", "PUSH7", "PUSH8", "PUSH9",
        "PUSH10", "PUSH11", "PUSH12", "PUSH13", "PUSH14", "PUSH15", "PUSH16", "PUSH17",
        "PUSH18", "PUSH19", "PUSH20", "PUSH21", "PUSH22", "PUSH23", "PUSH24", "PUSH25",
        "PUSH26", "PUSH27", "PUSH28", "PUSH29", "PUSH30", "PUSH31", "PUSH32",
    ];
    NAMES[(opcode - PUSH1) as usize]
}

fn dup_name(opcode: u16) -> &'static str {
    const NAMES: [&str; 16] = [
        "DUP1", "DUP2", "DUP3", "DUP4", "DUP5", "DUP6", "DUP7", "DUP8", "DUP9", "DUP10",
        "DUP11", "DUP12", "DUP13", "DUP14", "DUP15", "DUP16",
    ];
    NAMES[(opcode - DUP1) as usize]
}

fn swap_name(opcode: u16) -> &'static str {
    const NAMES: [&str; 16] = [
        "SWAP1", "SWAP2", "SWAP3", "SWAP4", "SWAP5", "SWAP6", "SWAP7", "SWAP8", "SWAP9",
        "SWAP10", "SWAP11", "SWAP12", "SWAP13", "SWAP14", "SWAP15", "SWAP16",
    ];
    NAMES[(opcode - SWAP1) as usize]
}

fn log_name(opcode: u16) -> &'static str {
    const NAMES: [&str; 5] = ["LOG0", "LOG1", "LOG2", "LOG3", "LOG4"];
    NAMES[(opcode - LOG0) as usize]
}

/// Mnemonic for a given opcode, including the synthetic markers.
pub fn name(opcode: u16) -> &'static str {
    match opcode {
        MOD_TIME => "MOD_TIME",
        SPECIAL_VALUE => "SPECIAL_VALUE",
        _ => match info(opcode) {
            Some(i) => i.name,
            None => "GARBAGE",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_arity() {
        assert_eq!(info(CALL).unwrap().pops, 7);
        assert_eq!(info(CALL).unwrap().pushes, 1);
        assert_eq!(info(SSTORE).unwrap().pops, 2);
        assert_eq!(info(0x7f).unwrap().push_data_size, 32);
        assert_eq!(info(0x8f).unwrap().pops, 16);
        assert_eq!(info(0x9f).unwrap().pops, 17);
        assert_eq!(info(0xa2).unwrap().pops, 4);
        assert!(info(0x0c).is_none());
        assert!(info(0x49).is_none());
    }

    #[test]
    fn test_category_sets() {
        assert!(is_halt(STOP) && is_halt(SELFDESTRUCT));
        assert!(!is_halt(JUMP));
        assert!(is_special(BLOCKHASH) && is_special(MOD_TIME));
        assert!(!is_special(TIMESTAMP));
        assert!(is_taint(CALLER) && is_taint(NUMBER) && is_taint(GASLIMIT));
        assert!(!is_taint(ADD));
        assert!(is_commutative(XOR) && !is_commutative(SUB));
        assert!(is_arithmetic(SIGNEXTEND) && is_arithmetic(SAR));
        assert!(!is_arithmetic(SHA3) && !is_arithmetic(POP));
    }

    #[test]
    fn test_mem_access() {
        assert_eq!(mem_read(SHA3), Some(mem(0, 1)));
        assert_eq!(mem_read(MLOAD).unwrap().fixed_length, Some(32));
        assert_eq!(mem_write(MSTORE8).unwrap().fixed_length, Some(8));
        assert_eq!(mem_write(CALL), Some(mem(5, 6)));
        assert!(mem_read(MSTORE).is_none());
        assert!(mem_write(SHA3).is_none());
    }

    #[test]
    fn test_names() {
        assert_eq!(name(PUSH1), "PUSH1");
        assert_eq!(name(0x7f), "PUSH32");
        assert_eq!(name(0x92), "SWAP3");
        assert_eq!(name(0x0c), "GARBAGE");
    }
}
