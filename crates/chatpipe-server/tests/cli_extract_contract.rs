use predicates::prelude::*;

fn chatpipe() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("chatpipe"));
    cmd.env("CHATPIPE_DOTENV", "0");
    cmd
}

fn paragraph(word: &str) -> String {
    std::iter::repeat(word).take(25).collect::<Vec<_>>().join(" ")
}

#[test]
fn extract_reads_stdin_and_prints_json_array() {
    let html = format!(
        "<html><body><nav>Home About</nav><article><p>{}\n{}\nshort</p></article></body></html>",
        paragraph("alpha"),
        paragraph("beta")
    );
    let out = chatpipe()
        .args(["extract", "--top-k", "1"])
        .write_stdin(html)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: Vec<String> = serde_json::from_slice(&out).expect("json array of strings");
    assert_eq!(v, vec![paragraph("alpha")]);
}

#[test]
fn extract_sentinel_input_is_empty_array() {
    chatpipe()
        .args(["extract"])
        .write_stdin("Could not load page")
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn extract_missing_file_fails() {
    chatpipe()
        .args(["extract", "--file", "/definitely/not/here.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not/here.html"));
}
