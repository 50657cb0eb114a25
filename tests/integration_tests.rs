use assert_cmd::Command;
use predicates::str::contains;

fn polyasm() -> Command {
    Command::cargo_bin("polyasm").unwrap()
}

#[test]
fn runs_without_arguments() {
    polyasm().assert().success().stdout(contains("polyasm"));
}

#[test]
fn runs_intel() {
    let mut cmd = polyasm();
    cmd.arg("run").arg("tests/files/sum.asm").arg("--minimal");

    cmd.assert()
        .success()
        .stdout(contains("EAX 15"))
        .stdout(contains("20 15"))
        .stdout(contains("Exiting program"));
}

#[test]
fn shorthand_runs_file() {
    let mut cmd = polyasm();
    cmd.arg("tests/files/sum.asm");
    cmd.assert().success().stdout(contains("Completed"));
}

#[test]
fn runs_att_by_extension() {
    let mut cmd = polyasm();
    cmd.arg("run").arg("tests/files/sum.att").arg("--minimal");
    cmd.assert().success().stdout(contains("EAX 15"));
}

#[test]
fn runs_mips_flavors() {
    let mut cmd = polyasm();
    cmd.arg("run").arg("tests/files/add.s").arg("--minimal");
    cmd.assert()
        .success()
        .stdout(contains("R10 42"))
        .stdout(contains("Exiting program"));

    let mut cmd = polyasm();
    cmd.arg("run").arg("tests/files/add.mml").arg("-m");
    cmd.assert().success().stdout(contains("R10 42"));
}

#[test]
fn runs_riscv_in_hex() {
    let mut cmd = polyasm();
    cmd.arg("run")
        .arg("tests/files/fib.rv")
        .arg("--base")
        .arg("hex")
        .arg("--minimal");
    cmd.assert().success().stdout(contains("X6 0x37"));
}

#[test]
fn flavor_flag_overrides_extension() {
    let mut cmd = polyasm();
    cmd.arg("check")
        .arg("tests/files/add.mml")
        .arg("--flavor")
        .arg("intel");
    cmd.assert().failure();

    let mut cmd = polyasm();
    cmd.arg("check").arg("tests/files/add.s").arg("-f").arg("arm");
    cmd.assert().failure().stderr(contains("Unknown flavor"));
}

#[test]
fn reports_infinite_loop() {
    let mut cmd = polyasm();
    cmd.arg("run").arg("tests/files/spin.asm").arg("--minimal");
    cmd.assert()
        .failure()
        .stderr(contains("Possible infinite loop detected"));
}

#[test]
fn step_guard_follows_environment() {
    let mut cmd = polyasm();
    cmd.arg("run")
        .arg("tests/files/spin.asm")
        .arg("--minimal")
        .env("POLYASM_MAX_STEPS", "25");
    cmd.assert().failure().stderr(contains("exceeded 25"));
}

#[test]
fn traces_to_stderr() {
    let mut cmd = polyasm();
    cmd.arg("run")
        .arg("tests/files/add.s")
        .arg("--minimal")
        .env("POLYASM_TRACE", "1");
    cmd.assert()
        .success()
        .stderr(contains("ADD $t2, $t0, $t1"));
}

#[test]
fn checks_files() {
    let mut cmd = polyasm();
    cmd.arg("check").arg("tests/files/fib.rv");
    cmd.assert().success().stdout(contains("no errors found"));

    let mut cmd = polyasm();
    cmd.arg("check").arg("tests/files/bad.asm");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown instruction `frob`"));
}

#[test]
fn steps_from_piped_input() {
    let mut cmd = polyasm();
    cmd.arg("step")
        .arg("tests/files/add.s")
        .arg("--minimal")
        .write_stdin("   q");
    cmd.assert()
        .success()
        .stdout(contains("ADD $t2, $t0, $t1"))
        .stdout(contains("R10 42"));
}

#[test]
fn encodes_mips() {
    let dest = std::env::temp_dir().join("polyasm_add.bits");
    let mut cmd = polyasm();
    cmd.arg("encode").arg("tests/files/add.mml").arg(&dest);
    cmd.assert().success().stdout(contains("Saved"));

    let bits = std::fs::read_to_string(&dest).unwrap();
    assert_eq!(bits.lines().count(), 3);
    assert_eq!(
        bits.lines().nth(2).unwrap(),
        "00000000000001000000000000001000 000000 01000 01001 01010 00000 100000"
    );
}

#[test]
fn refuses_to_encode_intel() {
    let mut cmd = polyasm();
    cmd.arg("encode").arg("tests/files/sum.asm");
    cmd.assert()
        .failure()
        .stderr(contains("has no binary encoding"));
}
