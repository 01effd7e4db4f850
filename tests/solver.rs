use assert_cmd::Command;
use predicates::prelude::*;
use std::env;
use std::fs;
use std::io;

// Going to keep it light: the happy paths, the "no solution" path and
// the search limits.

#[test]
fn test_cli_success() {
    let expected = std::fs::read_to_string("results/ring.txt").unwrap();

    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.pipe_stdin("puzzles/ring.txt")
        .unwrap()
        .assert()
        .success()
        .stdout(expected)
        .stderr(predicate::str::contains("1 solution(s)"));
}

#[test]
fn test_cli_input_flag() {
    let expected = std::fs::read_to_string("results/simple.txt").unwrap();

    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.arg("--input-file=puzzles/simple.txt")
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn test_cli_output_flag() -> io::Result<()> {
    let expected = std::fs::read_to_string("results/simple.txt").unwrap();

    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    let mut path = env::temp_dir();
    path.push("test-hashiwokakero-enumerator.txt");

    cmd.pipe_stdin("puzzles/simple.txt")
        .unwrap()
        .arg(format!("--output-file={}", path.to_str().unwrap()))
        .assert()
        .success()
        .stdout("");

    let actual = fs::read_to_string(path.clone())?;
    fs::remove_file(path)?;
    assert_eq!(expected, actual);

    Ok(())
}

#[test]
fn test_cli_multiple_solutions() {
    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.arg("--input-file=puzzles/split.txt")
        .assert()
        .success()
        .stdout(predicate::str::contains(" 1-2 1\n   | |\n 2-4-2\n | |  \n 1 2-1"))
        .stdout(predicate::str::contains(" 1 2-1\n | |  \n 2-4-2\n   | |\n 1-2 1"))
        .stdout(predicate::str::contains("\n\n").count(1))
        .stderr(predicate::str::contains("2 solution(s)"));
}

#[test]
fn test_cli_without_pruning() {
    let expected = std::fs::read_to_string("results/ring.txt").unwrap();

    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.arg("--no-structural-pruning")
        .pipe_stdin("puzzles/ring.txt")
        .unwrap()
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn test_cli_no_solutions() {
    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.write_stdin("...1..")
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("No solutions"));
}

#[test]
fn test_cli_junk_input() {
    // Anything that isn't a digit is water, so this is just a puzzle
    // with no islands.
    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.write_stdin("This is not a valid input.")
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("No solutions"));
}

#[test]
fn test_cli_node_limit() {
    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.arg("--node-limit=3")
        .pipe_stdin("puzzles/ring.txt")
        .unwrap()
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("Search incomplete: node limit of 3 reached"))
        .stderr(predicate::str::contains("No solutions").not());
}

#[test]
fn test_cli_time_limit() {
    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.arg("--time-limit-ms=0")
        .arg("--input-file=puzzles/fours.txt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Search incomplete: time limit"));
}

#[test]
fn test_cli_verbose() {
    let mut cmd = Command::cargo_bin("hashiwokakero-enumerator").unwrap();

    cmd.env_remove("RUST_LOG")
        .arg("--verbose")
        .pipe_stdin("puzzles/ring.txt")
        .unwrap()
        .assert()
        .success()
        .stderr(predicate::str::contains("8 islands, 10 candidate edges, 1 crossing pairs"));
}
