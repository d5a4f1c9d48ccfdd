use pipeasm::{assemble, AsmConfig};
use pretty_assertions::assert_eq;

fn bare() -> AsmConfig {
    AsmConfig {
        hazard_pad: 0,
        prologue: false,
        ..AsmConfig::default()
    }
}

fn words(src: &[&str]) -> Vec<u32> {
    assemble(bare(), src)
        .unwrap()
        .instructions()
        .map(|(_, w)| w)
        .collect()
}

#[test]
fn add_immediate_reference_word() {
    assert_eq!(words(&["add r1, r2, #5"]), vec![0xE282_1005]);
}

#[test]
fn data_processing_forms() {
    assert_eq!(
        words(&[
            "sub r1, r2, #5",
            "add r1, r2, r3",
            "mov r3, r2",
            "mov r3, #0xff",
            "lsl r1, r2, r3",
            "add r4, #$10",
        ]),
        vec![
            0xE2A2_1005,
            0xE082_1003,
            0xE1A0_3002,
            0xE3A0_30FF,
            0xE0C2_1003,
            0xE284_400A,
        ]
    );
}

#[test]
fn zero_register_is_aliased() {
    assert_eq!(
        words(&["mov r0, #1", "add r1, r0, r2"]),
        vec![0xE3A0_8001, 0xE088_1002]
    );
}

#[test]
fn single_transfers() {
    assert_eq!(
        words(&[
            "ldr r3, [fp, #-8]",
            "str r3, [fp, #-8]",
            "ldr r3, [sp, #4]",
            "ldr r3, [sp]",
        ]),
        vec![0xE71D_3008, 0xE72D_3008, 0xE79C_3004, 0xE79C_3000]
    );
}

#[test]
fn branch_exchange_and_nop() {
    assert_eq!(words(&["bx lr", "nop"]), vec![0xE12F_FF1E, 0xE1A0_0000]);
}

#[test]
fn compare_emits_two_set_less_than() {
    assert_eq!(words(&["cmp r1, r2"]), vec![0xE141_A002, 0xE142_B001]);
}

#[test]
fn mnemonics_and_registers_are_case_insensitive() {
    assert_eq!(words(&["ADD R1, R2, #5", "BX LR"]), vec![0xE282_1005, 0xE12F_FF1E]);
}

#[test]
fn instruction_addresses_follow_text_start() {
    let cfg = AsmConfig {
        text_start: 0x20,
        ..bare()
    };
    let prog = assemble(cfg, &["nop", "nop"]).unwrap();
    let addrs: Vec<u32> = prog.instructions().map(|(a, _)| a).collect();
    assert_eq!(addrs, vec![0x20, 0x21]);
}
