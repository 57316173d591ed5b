use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const TEMPLATE: &str = r#"<title>{{ page.title }}</title><!--% {{ pages | length }} %--><div id="post"></div>"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[allow(deprecated)]
fn quire(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("quire").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn build_uses_default_paths() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write(dir.path(), "site/a.md", "title: Hello\n\nAlpha\n");
    write(dir.path(), "site/b.md", "Beta\n");
    write(dir.path(), "template.html", TEMPLATE);

    quire(dir.path()).arg("build").assert().success();

    let a = fs::read_to_string(dir.path().join("out/a.html"))?;
    assert_eq!(a, "<title>Hello</title>2<div id=\"post\"><p>Alpha</p>\n</div>");
    let b = fs::read_to_string(dir.path().join("out/b.html"))?;
    assert_eq!(b, "<title>b</title>2<div id=\"post\"><p>Beta</p>\n</div>");
    Ok(())
}

#[test]
fn build_reads_config_file_and_flags() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write(dir.path(), "docs/index.md", "Home\n");
    write(dir.path(), "layout.html", "{{ site_info.name }}<main id=\"body\"></main>");
    write(
        dir.path(),
        "quire.toml",
        "[build]\nsource = \"docs\"\ntemplate = \"layout.html\"\n\n[site]\nname = \"Notes\"\n\n[render]\ninsertion_id = \"body\"\n",
    );

    quire(dir.path())
        .args(["build", "-o", "public"])
        .assert()
        .success();

    let index = fs::read_to_string(dir.path().join("public/index.html"))?;
    assert_eq!(index, "Notes<main id=\"body\"><p>Home</p>\n</main>");
    assert!(!dir.path().join("out").exists());
    Ok(())
}

#[test]
fn environment_overrides_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write(dir.path(), "site/a.md", "A\n");
    write(dir.path(), "template.html", TEMPLATE);
    write(dir.path(), "quire.toml", "[build]\noutput = \"from-file\"\n");

    quire(dir.path())
        .arg("build")
        .env("QUIRE_BUILD__OUTPUT", "from-env")
        .assert()
        .success();

    assert!(dir.path().join("from-env/a.html").exists());
    assert!(!dir.path().join("from-file").exists());
    Ok(())
}

#[test]
fn failed_pages_make_the_build_fail() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write(dir.path(), "site/a.md", "A\n");
    write(dir.path(), "site/b.md", "<!--% {{ nope }} %-->\n");
    write(dir.path(), "template.html", TEMPLATE);

    quire(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 pages failed"));
    assert!(dir.path().join("out/a.html").exists());

    quire(dir.path())
        .args(["build", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("b.md"));
    assert!(!dir.path().join("out/a.html").exists());
    Ok(())
}

#[test]
fn missing_template_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write(dir.path(), "site/a.md", "A\n");

    quire(dir.path())
        .args(["build", "-t", "nope.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read template nope.html"));
    Ok(())
}

#[test]
fn no_subcommand_prints_help() {
    quire(Path::new("."))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
