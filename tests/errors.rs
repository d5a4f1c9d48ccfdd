use std::error::Error as _;

use pipeasm::tables::Reg;
use pipeasm::{assemble, AsmConfig, AsmError, Assembler, OperandError};
use pretty_assertions::assert_eq;

fn bare() -> AsmConfig {
    AsmConfig {
        hazard_pad: 0,
        prologue: false,
        ..AsmConfig::default()
    }
}

fn err(src: &[&str]) -> AsmError {
    assemble(bare(), src).unwrap_err()
}

#[test]
fn unknown_mnemonic() {
    assert_eq!(
        err(&["nop", "mul r1, r2, r3"]),
        AsmError::UnknownMnemonic {
            line: 1,
            text: "mul r1, r2, r3".into(),
            mnemonic: "mul".into(),
        }
    );
}

#[test]
fn reserved_registers_are_rejected_with_source() {
    let e = err(&["add r9, r1, r2"]);
    assert_eq!(e.line(), Some(0));
    match &e {
        AsmError::MalformedOperand { source, .. } => {
            assert_eq!(*source, OperandError::ReservedRegister(Reg::R9))
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(e.to_string(), "line 0: malformed operand in `add r9, r1, r2`");
    // the cause is reported once, through the source chain
    assert_eq!(
        e.source().map(|s| s.to_string()),
        Some("register `r9` is reserved by the assembler".to_string())
    );
    let chained = format!("{:#}", anyhow::Error::new(e));
    assert_eq!(chained.matches("reserved by the assembler").count(), 1);
}

#[test]
fn immediates_are_range_checked() {
    assert!(matches!(
        err(&["mov r1, #256"]),
        AsmError::ImmediateOutOfRange { value: 256, bits: 8, .. }
    ));
    assert!(matches!(
        err(&["ldr r1, [sp, #-300]"]),
        AsmError::ImmediateOutOfRange { value: -300, .. }
    ));
    assert!(matches!(
        err(&["mov r1, #-1"]),
        AsmError::ImmediateOutOfRange { value: -1, .. }
    ));
}

#[test]
fn duplicate_label_names_both_lines() {
    assert_eq!(
        err(&["a:", "nop", "a:", "nop"]),
        AsmError::DuplicateLabel {
            line: 2,
            text: "a:".into(),
            label: "a".into(),
            first: 0,
        }
    );
}

#[test]
fn malformed_shapes() {
    for src in ["push {}", "ldr r1, [sp", "add r1, r2, r3, r4", "bx #1", "mov r1, [sp]"] {
        assert!(
            matches!(err(&[src]), AsmError::MalformedOperand { .. }),
            "{src}"
        );
    }
}

#[test]
fn conditional_branch_needs_compare() {
    assert_eq!(
        err(&["top:", "bge top"]),
        AsmError::BranchWithoutCompare {
            line: 1,
            text: "bge top".into(),
        }
    );
}

#[test]
fn workspace_base_must_fit() {
    let cfg = AsmConfig {
        workspace_base: 300,
        ..AsmConfig::default()
    };
    assert!(matches!(Assembler::new(cfg), Err(AsmError::InvalidConfig(_))));
}

#[test]
fn text_address_overflow_is_reported() {
    let cfg = AsmConfig {
        text_start: u32::MAX,
        ..bare()
    };
    let e = assemble(cfg, &["nop"]).unwrap_err();
    assert_eq!(e.line(), Some(0));
    assert!(matches!(e, AsmError::AddressOverflow { space: "instruction", .. }));
}

#[test]
fn store_through_pool_entry_is_rejected() {
    match err(&[".LC0:", ".word 1", "str r1, .L3", ".L3:", ".word .LC0"]) {
        AsmError::MalformedOperand { line, source, .. } => {
            assert_eq!((line, source), (2, OperandError::NotDataLabel(".L3".into())))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn load_from_code_label_is_rejected() {
    match err(&["main:", "nop", "ldr r1, main"]) {
        AsmError::MalformedOperand { source, .. } => {
            assert_eq!(source, OperandError::NotDataLabel("main".into()))
        }
        other => panic!("unexpected {other:?}"),
    }
}
