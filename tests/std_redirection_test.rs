use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn selftest() -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("examples/selftest")?;
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn runs_selftest() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = selftest()?;
    cmd.assert().success().stdout(predicate::str::ends_with("selftest passed\n"));
    Ok(())
}

#[test]
fn captured_text_never_reaches_the_console() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = selftest()?;
    cmd.assert()
        .success()
        .stdout(
            predicate::str::contains("hello")
                .or(predicate::str::contains("direct write under descriptors"))
                .or(predicate::str::contains("captured before suspension"))
                .or(predicate::str::contains("captured after suspension"))
                .or(predicate::str::contains("swallowed by dropped capture"))
                .or(predicate::str::contains("captured through moved guard"))
                .or(predicate::str::contains("through the stream object"))
                .not(),
        )
        .stderr(predicate::str::contains("err").not());
    Ok(())
}

#[test]
fn uncaptured_text_reaches_the_console() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = selftest()?;
    cmd.assert().success().stdout(
        predicate::str::contains("direct write under streams\n")
            .and(predicate::str::contains("printed during suspension\n"))
            .and(predicate::str::contains("printed after drop\n")),
    );
    Ok(())
}
