use assert_cmd::Command;
use rand;
use std::{
    env::temp_dir,
    path::{Path, PathBuf},
};

lazy_static! {
    static ref WORK_ROOT: PathBuf = temp_dir().join(format!("stddef-cc-{}", std::process::id()));
}

/// `defs.h`, a user header that includes `<stddef.h>` again.
const DEFS_H: &str =
    "#ifndef DEFS_H\n#define DEFS_H\n#include <stddef.h>\ntypedef size_t count_t;\n#endif\n";

/**
 * A directory of one test's files, removed with everything in it on drop.
 */
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn new() -> Self {
        let dir = WORK_ROOT.join(format!("{:016X}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, name: &str, text: &str) -> String {
        let path = self.dir.join(name);
        std::fs::write(&path, text).unwrap();
        path.display().to_string()
    }

    pub fn path(&self, name: &str) -> String {
        self.dir.join(name).display().to_string()
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
        // fails while other tests still hold their directories
        let _ = std::fs::remove_dir(&*WORK_ROOT);
    }
}

pub struct Output {
    pub success: bool,
    pub stdout: String,
}

pub fn run(args: &[&str]) -> Output {
    let output = Command::cargo_bin("stddef-cc")
        .unwrap()
        .args(args)
        .output()
        .unwrap();
    Output {
        success: output.status.success(),
        stdout: String::from_utf8(output.stdout).unwrap(),
    }
}

/**
 * Run `check` on `code` for the given target, with a directory holding `defs.h` on the search path.
 */
pub fn check_with(target: &str, extra: &[&str], code: &str) -> Output {
    let scratch = Scratch::new();
    scratch.write("defs.h", DEFS_H);
    let file = scratch.write("main.c", code);
    let include = scratch.dir().display().to_string();
    let mut args = vec!["--target", target, "check", "-I", include.as_str()];
    args.extend_from_slice(extra);
    args.push(file.as_str());
    run(&args)
}

pub fn check(target: &str, code: &str) {
    let output = check_with(target, &[], code);
    assert!(output.success, "{}", output.stdout);
}

pub fn check_fails(target: &str, code: &str) -> String {
    let output = check_with(target, &[], code);
    assert!(!output.success, "{}", output.stdout);
    output.stdout
}

pub fn header(args: &[&str]) -> String {
    let scratch = Scratch::new();
    let file = scratch.path("stddef.h");
    let mut all = args.to_vec();
    all.extend_from_slice(&["header", "-o", file.as_str()]);
    let output = run(&all);
    assert!(output.success, "{}", output.stdout);
    std::fs::read_to_string(&file).unwrap()
}
