//! Shared test utilities for classnet tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use anyhow::Result;
use classnet::config::Config;
use classnet::process::{Cmd, CommandRunner, CommandSpec, Namespace, RunStatus};
use classnet::textfile::{read_lines, write_lines};

/// Test environment with a host tree, a guest tree, a skeleton dir and a
/// home root under one temp directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub config: Config,
}

impl TestEnv {
    /// Create a new test environment with minimal passwd/group fixtures.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = Config::for_testing(temp_dir.path());

        for dir in [
            config.host_root.join("etc"),
            config.guest_root.join("etc"),
            config.home_root.clone(),
            config.skel_dir.clone(),
            config.unpack_dir.clone(),
        ] {
            fs::create_dir_all(&dir).expect("Failed to create fixture dir");
        }

        fs::write(
            config.etc_passwd(Namespace::Host),
            "root:x:0:0:root:/root:/bin/bash\n",
        )
        .expect("Failed to create host passwd");
        fs::write(config.etc_group(Namespace::Host), "root:x:0:\n")
            .expect("Failed to create host group");
        fs::write(
            config.etc_passwd(Namespace::Guest),
            "root:x:0:0:root:/root:/bin/bash\n",
        )
        .expect("Failed to create guest passwd");
        fs::write(config.etc_group(Namespace::Guest), "root:x:0:\n")
            .expect("Failed to create guest group");

        // Skeleton content every seeded home should receive.
        fs::write(config.skel_dir.join(".profile"), "# profile\n")
            .expect("Failed to create skel file");

        Self { _temp_dir: temp_dir, config }
    }

    /// Append a record line to a namespace's group file.
    pub fn add_group_line(&self, namespace: Namespace, line: &str) {
        append_line(&self.config.etc_group(namespace), line);
    }

    /// Append a record line to a namespace's passwd file.
    pub fn add_passwd_line(&self, namespace: Namespace, line: &str) {
        append_line(&self.config.etc_passwd(namespace), line);
    }

    /// The uid/gid the current test process can chown to.
    pub fn own_ids(&self) -> (u32, u32) {
        use std::os::unix::fs::MetadataExt;
        let meta = fs::metadata(self._temp_dir.path()).expect("Failed to stat temp dir");
        (meta.uid(), meta.gid())
    }
}

fn append_line(path: &PathBuf, line: &str) {
    let mut lines = read_lines(path).expect("Failed to read fixture");
    lines.push(line.to_string());
    write_lines(path, &lines).expect("Failed to write fixture");
}

/// A stand-in for the live system's account tools.
///
/// groupadd/groupmod/useradd/usermod edit the fixture passwd/group files
/// under the test config, with the same exit codes the real tools use.
/// tar and cp are executed for real (they only touch temp paths in tests).
/// Every spec received is logged so tests can assert on invocations.
pub struct FakeSystem {
    pub config: Config,
    pub log: RefCell<Vec<CommandSpec>>,
    /// Program names forced to exit 1, for failure-path tests.
    pub fail_on: RefCell<Vec<String>>,
}

impl FakeSystem {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            log: RefCell::new(Vec::new()),
            fail_on: RefCell::new(Vec::new()),
        }
    }

    pub fn force_failure(&self, program: &str) {
        self.fail_on.borrow_mut().push(program.to_string());
    }

    pub fn commands_run(&self) -> Vec<CommandSpec> {
        self.log.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    fn group_path(&self, namespace: Namespace) -> PathBuf {
        self.config.etc_group(namespace)
    }

    fn passwd_path(&self, namespace: Namespace) -> PathBuf {
        self.config.etc_passwd(namespace)
    }

    fn groupadd(&self, namespace: Namespace, args: &[String]) -> i32 {
        let name = &args[0];
        let gid = flag_value(args, "-g");

        let path = self.group_path(namespace);
        let lines = read_lines(&path).unwrap();
        if lines.iter().any(|l| l.starts_with(&format!("{}:", name))) {
            return 9;
        }
        let gid = match gid {
            Some(gid) => {
                if lines.iter().any(|l| l.split(':').nth(2) == Some(gid.as_str())) {
                    return 4;
                }
                gid
            }
            None => next_free_gid(&lines).to_string(),
        };
        append_line(&path, &format!("{}:x:{}:", name, gid));
        0
    }

    fn groupmod(&self, namespace: Namespace, args: &[String]) -> i32 {
        let name = &args[0];
        let Some(gid) = flag_value(args, "-g") else { return 2 };

        let path = self.group_path(namespace);
        let mut lines = read_lines(&path).unwrap();
        let mut found = false;
        for line in lines.iter_mut() {
            let mut fields: Vec<String> = line.split(':').map(str::to_string).collect();
            if fields.first().map(String::as_str) == Some(name.as_str()) && fields.len() >= 3 {
                fields[2] = gid.clone();
                *line = fields.join(":");
                found = true;
            }
        }
        if !found {
            return 6;
        }
        write_lines(&path, &lines).unwrap();
        0
    }

    fn useradd(&self, namespace: Namespace, args: &[String]) -> i32 {
        let name = &args[0];
        let uid = flag_value(args, "--uid").unwrap_or_default();
        let gid = flag_value(args, "--gid").unwrap_or_default();

        let path = self.passwd_path(namespace);
        let lines = read_lines(&path).unwrap();
        if lines.iter().any(|l| l.starts_with(&format!("{}:", name))) {
            return 9;
        }
        append_line(
            &path,
            &format!("{}:x:{}:{}::/home/{}:/bin/bash", name, uid, gid, name),
        );
        0
    }

    fn usermod(&self, namespace: Namespace, args: &[String]) -> i32 {
        let Some(group) = flag_value(args, "-G") else { return 2 };
        let Some(user) = args.last() else { return 2 };

        let passwd = read_lines(&self.passwd_path(namespace)).unwrap();
        if !passwd.iter().any(|l| l.starts_with(&format!("{}:", user))) {
            return 6;
        }

        let path = self.group_path(namespace);
        let mut lines = read_lines(&path).unwrap();
        let mut found = false;
        for line in lines.iter_mut() {
            let mut fields: Vec<String> = line.split(':').map(str::to_string).collect();
            if fields.first().map(String::as_str) == Some(group.as_str()) && fields.len() >= 3 {
                while fields.len() < 4 {
                    fields.push(String::new());
                }
                let mut members: Vec<String> = fields[3]
                    .split(',')
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect();
                if !members.contains(user) {
                    members.push(user.clone());
                }
                fields[3] = members.join(",");
                *line = fields.join(":");
                found = true;
            }
        }
        if !found {
            return 6;
        }
        write_lines(&path, &lines).unwrap();
        0
    }
}

impl CommandRunner for FakeSystem {
    fn run(&self, spec: &CommandSpec) -> Result<RunStatus> {
        self.log.borrow_mut().push(spec.clone());

        if self.fail_on.borrow().iter().any(|p| p == &spec.program) {
            return Ok(RunStatus { code: 1 });
        }

        let code = match spec.program.as_str() {
            "groupadd" => self.groupadd(spec.namespace, &spec.args),
            "groupmod" => self.groupmod(spec.namespace, &spec.args),
            "useradd" => self.useradd(spec.namespace, &spec.args),
            "usermod" => self.usermod(spec.namespace, &spec.args),
            // Archive and copy tools touch only temp paths in tests.
            "tar" | "cp" => {
                let result = Cmd::new(&spec.program)
                    .args(spec.args.iter())
                    .allow_fail()
                    .run()?;
                result.code()
            }
            _ => 127,
        };

        Ok(RunStatus { code })
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1).cloned())
}

fn next_free_gid(lines: &[String]) -> u32 {
    let max = lines
        .iter()
        .filter_map(|l| l.split(':').nth(2))
        .filter_map(|g| g.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    max.max(999) + 1
}
