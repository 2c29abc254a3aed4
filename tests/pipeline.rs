use pasvm::{CodegenOptions, CompileError, IndexedRead, compile, compile_with};

fn listing(src: &str) -> String {
  compile(src).expect("program should compile").listing()
}

fn lines(text: &str) -> Vec<&str> {
  text.lines().collect()
}

#[test]
fn start_and_stop_appear_once_and_in_order() {
  let out = listing(
    "program demo;
     var x: integer;
     procedure bump; begin x := x + 1 end;
     begin x := 0; bump; writeln(x) end.",
  );
  let lines = lines(&out);
  assert_eq!(lines.iter().filter(|l| **l == "START").count(), 1);
  assert_eq!(lines.iter().filter(|l| **l == "STOP").count(), 1);
  assert_eq!(lines[0], "START");
  let stop = lines.iter().position(|l| *l == "STOP").expect("STOP emitted");
  let entry = lines.iter().position(|l| *l == "FNbump:").expect("body emitted");
  assert!(stop < entry);
  assert_eq!(lines.last(), Some(&"RETURN"));
}

#[test]
fn assignment_then_output() {
  let out = listing("program p; var x: integer; begin x := 5; writeln(x) end.");
  assert_eq!(
    out,
    "START\nPUSHI 5\nSTOREG 0\nPUSHG 0\nSTRI\nWRITES\nWRITELN\nSTOP\n"
  );
}

#[test]
fn undeclared_identifier_stops_before_generation() {
  let err = compile("program p; begin y := 1 end.").expect_err("y is undeclared");
  assert!(matches!(err, CompileError::Semantic { line: 1, .. }));
  assert_eq!(
    err.to_string(),
    "semantic error at line 1: undeclared identifier 'y'"
  );
}

#[test]
fn integer_into_real_variable_is_rejected() {
  let err = compile("program p;\nvar r: real;\nbegin\n  r := 1\nend.").expect_err("no promotion");
  assert_eq!(err.line(), Some(4));
}

#[test]
fn mixed_arithmetic_has_single_conversion() {
  let out = listing("program p; var r: real; begin r := 2 * 1.5 end.");
  let lines = lines(&out);
  assert_eq!(lines.iter().filter(|l| **l == "ITOF").count(), 1);
  assert_eq!(
    lines,
    vec!["START", "PUSHI 2", "ITOF", "PUSHF 1.5", "FMUL", "STOREG 0", "STOP"]
  );
}

#[test]
fn literal_index_checked_statically_dynamic_index_not() {
  let err = compile("program p; var a: array[1..5] of integer; begin a[6] := 1 end.")
    .expect_err("6 is outside 1..5");
  assert!(err.to_string().contains("outside the bounds"));

  let out = listing(
    "program p; var a: array[1..5] of integer; i: integer; begin i := 6; a[i] := 1 end.",
  );
  assert!(out.contains("STOREN"));
}

#[test]
fn counting_loop_lowering() {
  let out = listing("program p; var i: integer; begin for i := 1 to 3 do writeln(i) end.");
  assert_eq!(
    lines(&out),
    vec![
      "START", "PUSHI 1", "STOREG 0", "L0:", "PUSHG 0", "PUSHI 3", "INFEQ", "JZ L1", "PUSHG 0",
      "STRI", "WRITES", "WRITELN", "PUSHG 0", "PUSHI 1", "ADD", "STOREG 0", "JUMP L0", "L1:",
      "STOP"
    ]
  );
}

#[test]
fn constants_are_stored_before_the_body() {
  let out = listing(
    "program circle; const PI = 3.14; var r, area: real;
     begin r := 2.0; area := PI * r * r; writeln(area) end.",
  );
  let lines = lines(&out);
  assert_eq!(lines[..3], ["START", "PUSHF 3.14", "STOREG 0"]);
  assert_eq!(lines[3..5], ["PUSHF 2.0", "STOREG 1"]);
}

#[test]
fn separate_functions_get_separate_frames() {
  let out = listing(
    "program p; var x: integer;
     function inc(a: integer): integer; begin inc := a + 1 end;
     function dbl(b: integer): integer; begin dbl := b * 2 end;
     begin x := dbl(inc(1)) end.",
  );
  // x = 0, inc result = 1, dbl result = 2, inc.a = 3, dbl.b = 4.
  assert_eq!(
    lines(&out)[..13],
    [
      "START", "PUSHI 1", "STOREG 3", "PUSHA FNinc", "CALL", "PUSHG 1", "STOREG 4",
      "PUSHA FNdbl", "CALL", "PUSHG 2", "STOREG 0", "STOP", "FNinc:"
    ]
  );
}

#[test]
fn recursion_overwrites_the_shared_frame() {
  let out = listing(
    "program p; var r: integer;
     function fact(n: integer): integer;
     begin
       if n <= 1 then fact := 1
       else fact := n * fact(n - 1)
     end;
     begin r := fact(5); writeln(r) end.",
  );
  let lines = lines(&out);
  // The outer call and the recursive call both target slot 2, the only
  // storage `n` has.
  assert_eq!(
    lines.iter().filter(|l| **l == "STOREG 2").count(),
    2,
    "{out}"
  );
  assert_eq!(lines.iter().filter(|l| **l == "PUSHA FNfact").count(), 2);
}

#[test]
fn indexed_input_lowering_modes() {
  let src = "program p; var a: array[1..3] of integer; begin readln(a[1]) end.";
  let corrected = compile(src).expect("compiles").listing();
  assert!(corrected.ends_with("PUSHG 0\nPUSHI 1\nPUSHI 1\nSUB\nREAD\nATOI\nSTOREN\nSTOP\n"));

  let legacy = compile_with(
    src,
    &CodegenOptions {
      indexed_read: IndexedRead::AsRead,
    },
  )
  .expect("compiles")
  .listing();
  assert_eq!(corrected, legacy);

  let zero_based = "program p; var a: array[0..2] of integer; begin readln(a[1]) end.";
  let legacy = compile_with(
    zero_based,
    &CodegenOptions {
      indexed_read: IndexedRead::AsRead,
    },
  )
  .expect("compiles")
  .listing();
  assert!(legacy.ends_with("PUSHG 0\nPUSHI 1\nSTOP\n"));
  assert!(!legacy.contains("READ"));
}

#[test]
fn lexical_errors_are_reported_and_skipped() {
  let compilation = compile("program p; var x: integer; begin x := 1 # end.").expect("compiles");
  assert_eq!(compilation.diagnostics.len(), 1);
  assert_eq!(
    compilation.diagnostics[0].to_string(),
    "lexical error at line 1: illegal character '#'"
  );
}

#[test]
fn lexical_errors_survive_a_failed_compile() {
  let mut diagnostics = Vec::new();
  let err = pasvm::compile_reporting(
    "program p; var x: integer; begin x := 1 $ 2 end.",
    &CodegenOptions::default(),
    |d| diagnostics.push(d.to_string()),
  )
  .expect_err("skipping '$' leaves `1 2`");
  assert!(matches!(err, CompileError::Syntax { .. }), "{err}");
  assert_eq!(
    diagnostics,
    vec!["lexical error at line 1: illegal character '$'".to_string()]
  );
}

#[test]
fn overflowing_real_literal_does_not_compile_to_inf() {
  let src = format!("program p; var r: real; begin r := {}.0 end.", "9".repeat(400));
  let mut diagnostics = Vec::new();
  let result = pasvm::compile_reporting(&src, &CodegenOptions::default(), |d| {
    diagnostics.push(d.to_string())
  });
  assert!(result.is_err());
  assert_eq!(diagnostics.len(), 1);
  assert!(diagnostics[0].contains("out of range"), "{diagnostics:?}");
}

#[test]
fn syntax_error_names_the_offending_token() {
  let err = compile("program p;\nbegin\n  x := \nend.").expect_err("missing expression");
  assert!(matches!(err, CompileError::Syntax { line: 4, .. }), "{err}");
}

#[test]
fn missing_terminator_is_unexpected_end_of_input() {
  let err = compile("program p; begin end").expect_err("no final '.'");
  assert!(matches!(err, CompileError::UnexpectedEof { .. }), "{err}");
}

#[test]
fn check_stops_after_analysis() {
  let diagnostics = pasvm::check("program p; var s: string; begin s := 'ok' end.").expect("valid");
  assert!(diagnostics.is_empty());
  assert!(pasvm::check("program p; var s: string; begin s := 1 end.").is_err());
}

#[test]
fn listing_helper_matches_compilation() {
  let src = "program hello; begin writeln('hello, world') end.";
  let text = pasvm::generate_listing(src).expect("compiles");
  assert_eq!(text, "START\nPUSHS \"hello, world\"\nWRITES\nWRITELN\nSTOP\n");
}
