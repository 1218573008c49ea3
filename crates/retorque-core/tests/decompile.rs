//! End-to-end decompilation: bytes → container → instructions → CFGs →
//! regions → source text.

use dso::writer::DsoBuilder;
use dso::FileData;
use retorque_core::decompile;
use retorque_core::disasm::opcode::Opcode;

const NO_IDENT: u32 = u32::MAX;

fn op(b: &mut DsoBuilder, opcode: Opcode) -> u32 {
    b.emit(opcode as u32)
}

fn decompile_image(b: &DsoBuilder) -> String {
    let image = b.build();
    let file = FileData::parse(&image, Some(44)).expect("container parse failed");
    decompile(&file).expect("decompilation failed")
}

#[test]
fn empty_script_produces_empty_output() {
    let b = DsoBuilder::new(44);
    assert_eq!(decompile_image(&b), "");
}

#[test]
fn self_jump_becomes_infinite_while() {
    let mut b = DsoBuilder::new(44);
    op(&mut b, Opcode::Jmp);
    b.emit(0);
    assert_eq!(decompile_image(&b), "while (true) {\n}\n");
}

#[test]
fn if_then_with_inverted_branch() {
    // if (%a == 1) %b = 2;
    let mut b = DsoBuilder::new(44);
    let s_a = b.add_string("%a");
    let s_b = b.add_string("%b");

    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_a);
    op(&mut b, Opcode::LoadVarUint);
    op(&mut b, Opcode::LoadImmedUint);
    b.emit(1);
    op(&mut b, Opcode::CmpEq);
    op(&mut b, Opcode::JmpIfNot);
    let patch_at = b.emit(0);
    op(&mut b, Opcode::LoadImmedUint);
    b.emit(2);
    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_b);
    op(&mut b, Opcode::SaveVarUint);
    op(&mut b, Opcode::UintToNone);
    let target = op(&mut b, Opcode::Return);
    b.patch(patch_at, target);

    assert_eq!(
        decompile_image(&b),
        "if (%a == 1) {\n  %b = 2;\n}\nreturn;\n"
    );
}

#[test]
fn if_then_else_diamond() {
    // if (%a == 1) { %b = 2; } else { %b = 3; }
    let mut b = DsoBuilder::new(44);
    let s_a = b.add_string("%a");
    let s_b = b.add_string("%b");

    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_a);
    op(&mut b, Opcode::LoadVarUint);
    op(&mut b, Opcode::LoadImmedUint);
    b.emit(1);
    op(&mut b, Opcode::CmpEq);
    op(&mut b, Opcode::JmpIfNot);
    let to_else = b.emit(0);

    op(&mut b, Opcode::LoadImmedUint);
    b.emit(2);
    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_b);
    op(&mut b, Opcode::SaveVarUint);
    op(&mut b, Opcode::UintToNone);
    op(&mut b, Opcode::Jmp);
    let to_join = b.emit(0);

    let else_addr = op(&mut b, Opcode::LoadImmedUint);
    b.emit(3);
    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_b);
    op(&mut b, Opcode::SaveVarUint);
    op(&mut b, Opcode::UintToNone);

    let join_addr = op(&mut b, Opcode::Return);
    b.patch(to_else, else_addr);
    b.patch(to_join, join_addr);

    assert_eq!(
        decompile_image(&b),
        "if (%a == 1) {\n  %b = 2;\n} else {\n  %b = 3;\n}\nreturn;\n"
    );
}

#[test]
fn while_loop_with_increment() {
    // while (%i < 10) %i++;
    let mut b = DsoBuilder::new(44);
    let s_i = b.add_string("%i");

    let head = op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_i);
    op(&mut b, Opcode::LoadVarUint);
    op(&mut b, Opcode::LoadImmedUint);
    b.emit(10);
    op(&mut b, Opcode::CmpLt);
    op(&mut b, Opcode::JmpIfNot);
    let to_exit = b.emit(0);

    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_i);
    op(&mut b, Opcode::LoadVarUint);
    op(&mut b, Opcode::LoadImmedUint);
    b.emit(1);
    op(&mut b, Opcode::Add);
    op(&mut b, Opcode::SaveVarUint);
    op(&mut b, Opcode::UintToNone);
    op(&mut b, Opcode::Jmp);
    b.emit(head);

    let exit = op(&mut b, Opcode::Return);
    b.patch(to_exit, exit);

    assert_eq!(
        decompile_image(&b),
        "while (%i < 10) {\n  %i++;\n}\nreturn;\n"
    );
}

#[test]
fn function_declaration_with_return_value() {
    // function foo(%a) { return %a; }
    let mut b = DsoBuilder::new(44);
    let s_foo = b.add_string("foo");
    let s_a = b.add_string("%a");

    op(&mut b, Opcode::FuncDecl);
    b.emit_ident(s_foo);
    b.emit(NO_IDENT); // namespace
    b.emit(NO_IDENT); // package
    b.emit(1); // has_body
    let end_patch = b.emit(0);
    b.emit(1); // argc
    b.emit_ident(s_a);

    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_a);
    op(&mut b, Opcode::LoadVarStr);
    op(&mut b, Opcode::Return);

    let end = op(&mut b, Opcode::Return);
    b.patch(end_patch, end);

    assert_eq!(
        decompile_image(&b),
        "function foo(%a) {\n  return %a;\n}\n\nreturn;\n"
    );
}

#[test]
fn object_declaration_with_field() {
    // new SimObject(Orb) { radius = 5; };
    let mut b = DsoBuilder::new(44);
    let s_class = b.add_string("SimObject");
    let s_name = b.add_string("Orb");
    let s_field = b.add_string("radius");

    op(&mut b, Opcode::PushFrame);
    op(&mut b, Opcode::LoadImmedStr);
    b.emit(s_class);
    op(&mut b, Opcode::Push);
    op(&mut b, Opcode::LoadImmedStr);
    b.emit(s_name);
    op(&mut b, Opcode::Push);
    op(&mut b, Opcode::CreateObject);
    b.emit(NO_IDENT); // parent
    b.emit(0); // is_datablock
    b.emit(0); // fail jump (unused on the success path)
    op(&mut b, Opcode::SetCurObjectNew);
    op(&mut b, Opcode::SetCurField);
    b.emit_ident(s_field);
    op(&mut b, Opcode::LoadImmedUint);
    b.emit(5);
    op(&mut b, Opcode::SaveFieldUint);
    op(&mut b, Opcode::AddObject);
    b.emit(1);
    op(&mut b, Opcode::EndObject);
    b.emit(1);
    op(&mut b, Opcode::UintToNone);
    op(&mut b, Opcode::Return);

    assert_eq!(
        decompile_image(&b),
        "new SimObject(Orb) {\n  radius = 5;\n};\nreturn;\n"
    );
}

#[test]
fn string_concat_and_call() {
    // %msg = "a" SPC %b; echo(%msg);
    let mut b = DsoBuilder::new(44);
    let s_a = b.add_string("a");
    let s_b = b.add_string("%b");
    let s_msg = b.add_string("%msg");
    let s_echo = b.add_string("echo");

    op(&mut b, Opcode::LoadImmedStr);
    b.emit(s_a);
    op(&mut b, Opcode::AdvanceStrAppendChar);
    b.emit(' ' as u32);
    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_b);
    op(&mut b, Opcode::LoadVarStr);
    op(&mut b, Opcode::RewindStr);
    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_msg);
    op(&mut b, Opcode::SaveVarStr);
    op(&mut b, Opcode::StrToNone);

    op(&mut b, Opcode::PushFrame);
    op(&mut b, Opcode::SetCurVar);
    b.emit_ident(s_msg);
    op(&mut b, Opcode::LoadVarStr);
    op(&mut b, Opcode::Push);
    op(&mut b, Opcode::CallFunc);
    b.emit_ident(s_echo);
    b.emit(NO_IDENT); // namespace
    b.emit(0); // call type: function
    op(&mut b, Opcode::StrToNone);
    op(&mut b, Opcode::Return);

    assert_eq!(
        decompile_image(&b),
        "%msg = \"a\" SPC %b;\necho(%msg);\nreturn;\n"
    );
}

#[test]
fn irreducible_cycle_terminates_with_goto() {
    // Entry branches into a two-entry cycle; neither cycle node dominates
    // the other, so structural recovery has to synthesize a goto.
    let mut b = DsoBuilder::new(44);

    op(&mut b, Opcode::LoadImmedUint);
    b.emit(1);
    op(&mut b, Opcode::JmpIf);
    let to_b = b.emit(0);

    let block_a = op(&mut b, Opcode::LoadImmedUint);
    b.emit(2);
    op(&mut b, Opcode::Jmp);
    let a_to_b = b.emit(0);

    let block_b = op(&mut b, Opcode::LoadImmedUint);
    b.emit(3);
    op(&mut b, Opcode::Jmp);
    b.emit(block_a);

    b.patch(to_b, block_b);
    b.patch(a_to_b, block_b);

    let source = decompile_image(&b);
    assert!(
        source.contains("goto label_"),
        "expected a synthesized goto, got:\n{source}"
    );
    assert!(
        source.contains("label_0x"),
        "expected a label for the goto target, got:\n{source}"
    );
}

#[test]
fn bad_branch_target_fails_with_format_error() {
    let mut b = DsoBuilder::new(44);
    op(&mut b, Opcode::LoadImmedUint);
    b.emit(7);
    op(&mut b, Opcode::Jmp);
    b.emit(1); // middle of the load's operand

    let image = b.build();
    let file = FileData::parse(&image, Some(44)).unwrap();
    let err = decompile(&file).unwrap_err();
    assert_eq!(err.kind(), retorque_core::ErrorKind::Format);
}
