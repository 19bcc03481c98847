use evmtaint::analysis::Engine;
use evmtaint::evm::opcode;
use evmtaint::report::Report;
use evmtaint::util::FromHexString;

// PUSH20 of the 2^160-1 address mask
const MASK20: &str = "73ffffffffffffffffffffffffffffffffffffffff";

fn engine(hex: &str) -> Engine {
    Engine::new(hex.from_hex_string().unwrap())
}

fn run(hex: &str) -> (bool, Report) {
    let mut engine = engine(hex);
    let reported = engine.run().unwrap();
    let report = Report::new(&engine, reported);
    (reported, report)
}

fn assert_clean(report: &Report) {
    assert!(!report.is_reported);
    assert_eq!(report.steps, 1);
    assert_eq!(report.conditions, 0);
    assert_eq!(report.call_values, 0);
    assert_eq!(report.to_addresses, 0);
    assert_eq!(report.todo_keys, 0);
}

#[test]
fn test_empty_bytecode() {
    let (reported, report) = run("");
    assert!(!reported);
    assert_clean(&report);
}

#[test]
fn test_prologue_only() {
    let (reported, report) = run("6080604052");
    assert!(!reported);
    assert_clean(&report);
}

#[test]
fn test_time_mod_without_call() {
    // TIMESTAMP MOD present, but nothing to call
    let (reported, report) = run("60806040524206");
    assert!(!reported);
    assert_clean(&report);
}

#[test]
fn test_special_without_call() {
    let (reported, report) = run("608060405241");
    assert!(!reported);
    assert_clean(&report);
}

/// A call to `CALLER & (2^160-1)` with value zero never reports: the
/// non-zero-value filter rules it out even though a special source
/// (BLOCKHASH) appears along the way.
#[test]
fn test_zero_value_call_not_reported() {
    let hex = concat!(
        "6080604052",
        "600040",   // BLOCKHASH(0), so the early-exit check passes
        "50",       // POP
        "6000",     // retLength
        "6000",     // retOffset
        "6000",     // argsLength
        "6000",     // argsOffset
        "6000",     // value = 0
    );
    let hex = format!("{hex}{MASK20}33165af100");
    let (reported, report) = run(&hex);
    assert!(!reported);
    assert_clean(&report);
}

/// `JUMPI` guarded by `EQ(BLOCKHASH(0), 0)` in front of a value-
/// bearing call to the sender: one condition finding in phase one.
#[test]
fn test_blockhash_guarded_call() {
    let hex = concat!(
        "6080604052",
        "6000", "40",   // BLOCKHASH(0)
        "6000", "14",   // EQ(_, 0)
        "600f", "57",   // JUMPI -> 0x0f
        "00",           // fallthrough STOP
        "5b",           // 0x0f: JUMPDEST
        "6000", "6000", "6000", "6000",
        "6001",         // value = 1
    );
    let hex = format!("{hex}{MASK20}33165af100");
    let (reported, report) = run(&hex);
    assert!(reported);
    assert_eq!(report.steps, 1);
    assert_eq!(report.conditions, 1);
    assert_eq!(report.call_values, 0);
    assert_eq!(report.to_addresses, 0);
}

/// A time-modulo guard taints the condition through the synthetic
/// MOD_TIME marker even though no special opcode appears directly.
#[test]
fn test_timestamp_mod_guard() {
    let hex = concat!(
        "6080604052",
        "600a", "42", "06",  // TIMESTAMP % 10
        "6000", "14",        // EQ(_, 0)
        "6010", "57",        // JUMPI -> 0x10
        "00",
        "5b",                // 0x10: JUMPDEST
        "6000", "6000", "6000", "6000",
        "6001",
    );
    let hex = format!("{hex}{MASK20}33165af100");
    let (reported, report) = run(&hex);
    assert!(reported);
    assert_eq!(report.steps, 1);
    assert_eq!(report.conditions, 1);
}

/// Paying COINBASE directly: the destination itself is tainted by a
/// special source.
#[test]
fn test_coinbase_destination() {
    let hex = concat!(
        "6080604052",
        "6000", "6000", "6000", "6000",
        "6001",  // value = 1
        "41",    // COINBASE as destination
        "5a",    // GAS
        "f1",
        "00",
    );
    let (reported, report) = run(hex);
    assert!(reported);
    assert_eq!(report.steps, 1);
    assert_eq!(report.conditions, 0);
    assert_eq!(report.call_values, 0);
    assert_eq!(report.to_addresses, 1);
}

/// Phase two: phase one only sees `SSTORE(SHA3(CALLER), BLOCKHASH)`,
/// which seeds the key; re-running with the seed makes the `SLOAD`
/// along the calling path resolve to the tainted value and the guard
/// fires.
#[test]
fn test_two_phase_storage_roundtrip() {
    let store_branch = concat!(
        "5b",           // 0x40: JUMPDEST
        "33", "6000", "52",  // MSTORE(0, CALLER)
        "6000", "40",   // BLOCKHASH(0)
        "6020", "6000", "20",  // SHA3(0, 0x20)
        "55",           // SSTORE(key, BLOCKHASH)
        "00",
    );
    let load_branch = concat!(
        "33", "6000", "52",  // MSTORE(0, CALLER)
        "6020", "6000", "20",  // SHA3(0, 0x20)
        "54",           // SLOAD(key)
        "6000", "14",   // EQ(_, 0)
        "601b", "57",   // JUMPI -> 0x1b
        "00",
        "5b",           // 0x1b: JUMPDEST
        "6000", "6000", "6000", "6000",
        "6001",
    );
    let hex = format!(
        "6080604052{dispatch}{load}{mask}33165af100{store}",
        dispatch = "6001604057", // PUSH1 1, PUSH1 0x40, JUMPI
        load = load_branch,
        mask = MASK20,
        store = store_branch,
    );
    let (reported, report) = run(&hex);
    assert!(reported);
    assert_eq!(report.steps, 2);
    assert_eq!(report.todo_keys, 1);
    assert_eq!(report.conditions, 1);
    assert_eq!(report.call_values, 0);
    assert_eq!(report.to_addresses, 0);
}

/// A stack-image already seen at an offset cuts the revisit, so a
/// tight unconditional loop terminates.
#[test]
fn test_image_cutoff_terminates_loop() {
    let hex = concat!(
        "6080604052",
        "41", "50",  // COINBASE, POP (keeps the early-exit check honest)
        "5b",        // 0x07: JUMPDEST
        "6007", "56", // JUMP -> 0x07
        "5b", "f1", "00",
    );
    let eng = engine(hex);
    assert!(eng.disassembly().contains(opcode::CALL));
    assert!(eng.disassembly().is_jumpdest(7));
    let (reported, report) = run(hex);
    assert!(!reported);
    assert_clean(&report);
}

#[test]
fn test_unsupported_prologue() {
    // COINBASE + CALL pass the early-exit checks, then the header
    // check rejects the bytecode.
    let mut engine = engine("41f1");
    assert!(engine.run().is_err());
}

#[test]
fn test_report_serialisation() {
    let (reported, report) = run("6080604052");
    assert!(!reported);
    let mut out = Vec::new();
    report.write_pretty(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    // four-space indent, field order as documented
    assert!(text.starts_with("{\n    \"is_reported\": false"));
    assert!(text.contains("\"steps\": 1"));
    assert!(text.contains("\"todo_keys\": 0"));
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["conditions"], 0);
}
