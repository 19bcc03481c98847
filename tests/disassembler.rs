use evmtaint::evm::{opcode, Disassembly};
use evmtaint::util::FromHexString;
use ruint::aliases::U256;

fn disassemble(hex: &str) -> Disassembly {
    let bytes = hex.from_hex_string().unwrap();
    Disassembly::new(&bytes)
}

/// The sweep is dense and non-overlapping: each instruction starts
/// exactly where the previous one (plus its immediate) ended.
#[test]
fn test_sweep_density() {
    let disasm = disassemble("60806040526000357c01000000000000000000000000000000000000000000000000000000009004");
    let insns = disasm.instructions();
    for pair in insns.windows(2) {
        let size = opcode::info(pair[0].opcode).map_or(0, |i| i.push_data_size);
        assert_eq!(pair[0].offset + 1 + size, pair[1].offset);
    }
}

#[test]
fn test_empty_bytecode_synthesizes_stop() {
    let disasm = disassemble("");
    let insns = disasm.instructions();
    assert_eq!(insns.len(), 1);
    assert_eq!(insns[0].opcode, opcode::STOP);
    assert_eq!(insns[0].offset, 0);
}

#[test]
fn test_prologue_only() {
    let disasm = disassemble("6080604052");
    let insns = disasm.instructions();
    // PUSH1 0x80, PUSH1 0x40, MSTORE, then the synthetic STOP
    assert_eq!(insns.len(), 4);
    assert_eq!(insns[0].opcode, opcode::PUSH1);
    assert_eq!(insns[0].push_data, Some(U256::from(0x80)));
    assert_eq!(insns[2].opcode, opcode::MSTORE);
    assert_eq!(insns[3].opcode, opcode::STOP);
    assert!(disasm.contains(opcode::PUSH1));
    assert!(disasm.contains(opcode::MSTORE));
    assert!(disasm.contains(opcode::STOP));
    assert!(!disasm.contains(opcode::CALL));
}

#[test]
fn test_no_synthetic_stop_after_halt() {
    let disasm = disassemble("608000");
    let insns = disasm.instructions();
    assert_eq!(insns.len(), 2);
    assert_eq!(insns[1].opcode, opcode::STOP);
    assert_eq!(insns[1].offset, 2);
}

/// Jump destinations are exactly the instruction offsets holding
/// 0x5b; a 0x5b inside push data is an immediate, not a landing
/// point.
#[test]
fn test_jumpdest_extraction() {
    // PUSH1 0x5b, JUMPDEST, STOP
    let disasm = disassemble("605b5b00");
    assert!(disasm.is_jumpdest(2));
    assert!(!disasm.is_jumpdest(1));
    assert_eq!(disasm.jumpdests().len(), 1);
}

/// The sentinel offsets {0, 2, 7} count as invalid jump targets
/// unless an actual JUMPDEST sits there.
#[test]
fn test_invalid_jumpdests() {
    let disasm = disassemble("605b5b00");
    assert!(disasm.is_invalid_jumpdest(0));
    assert!(!disasm.is_invalid_jumpdest(2));
    assert!(disasm.is_invalid_jumpdest(7));

    let disasm = disassemble("6080604052");
    assert!(disasm.is_invalid_jumpdest(0));
    assert!(disasm.is_invalid_jumpdest(2));
    assert!(disasm.is_invalid_jumpdest(7));
}

/// A truncated push immediate is zero-padded on the right.
#[test]
fn test_truncated_push_padding() {
    // PUSH4 with only two immediate bytes available
    let disasm = disassemble("63ffff");
    let insns = disasm.instructions();
    assert_eq!(insns[0].opcode, 0x63);
    assert_eq!(insns[0].push_data, Some(U256::from(0xffff0000u64)));
}

/// Bytes after a halt or unconditional JUMP still disassemble, but do
/// not contribute to the live-opcode set until a JUMPDEST.
#[test]
fn test_dead_code_presence() {
    // STOP, CALL (dead), JUMPDEST, TIMESTAMP
    let disasm = disassemble("00f15b42");
    assert!(!disasm.contains(opcode::CALL));
    assert!(disasm.contains(opcode::TIMESTAMP));
    // the dead instruction is still in the table
    assert_eq!(disasm.at_offset(1).unwrap().opcode, opcode::CALL);

    // JUMP kills the sweep just like a halt
    let disasm = disassemble("56f1");
    assert!(!disasm.contains(opcode::CALL));
}

#[test]
fn test_offset_pc_lookup() {
    let disasm = disassemble("6080604052");
    let at4 = disasm.at_offset(4).unwrap();
    assert_eq!(at4.pc, 2);
    assert_eq!(disasm.at_pc(2).unwrap().offset, 4);
    assert!(disasm.at_offset(1).is_none());
    assert!(disasm.at_pc(9).is_none());
}

/// Unknown opcodes carry no immediate and advance by one byte.
#[test]
fn test_unknown_opcode() {
    let disasm = disassemble("0c42");
    let insns = disasm.instructions();
    assert_eq!(insns[0].opcode, 0x0c);
    assert_eq!(insns[1].opcode, opcode::TIMESTAMP);
    assert_eq!(insns[1].offset, 1);
}
