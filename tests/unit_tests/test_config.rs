// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fs;

use serial_test::serial;
use wlan_sentry_rs::cfg::config::{ConfigFile, ConfigPaths};

fn write(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write config");
    path
}

#[test]
fn test_basic_parse_and_case_folding() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(
        dir.path(),
        "main.conf",
        "# comment line\nServer_Name=test box\nlog_types=pcapng\n",
    );

    let cfg = ConfigFile::new();
    cfg.parse_config(&path).expect("parse");

    assert_eq!(cfg.fetch_opt("server_name").as_deref(), Some("test box"));
    assert_eq!(cfg.fetch_opt("SERVER_NAME").as_deref(), Some("test box"));
    assert!(cfg.fetch_opt("missing").is_none());
    assert_eq!(cfg.fetch_opt_dfl("missing", "dfl"), "dfl");
}

#[test]
fn test_append_and_multivalue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(
        dir.path(),
        "main.conf",
        "source=wlan0\nsource+=wlan1\nsource+=wlan2\n",
    );

    let cfg = ConfigFile::new();
    cfg.parse_config(&path).expect("parse");

    assert_eq!(cfg.fetch_opt_vec("source"), vec!["wlan0", "wlan1", "wlan2"]);
    // scalar fetch reads the last value
    assert_eq!(cfg.fetch_opt("source").as_deref(), Some("wlan2"));
}

#[test]
fn test_include_and_opt_include() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "sub.conf", "from_sub=yes\n");

    let main = write(
        dir.path(),
        "main.conf",
        &format!(
            "include={}\nopt_include={}\nopt_include={}\n",
            dir.path().join("sub.conf").display(),
            dir.path().join("opt_*.conf").display(),
            dir.path().join("never_exists_*.conf").display(),
        ),
    );
    write(dir.path(), "opt_a.conf", "from_opt=yes\n");

    let cfg = ConfigFile::new();
    cfg.parse_config(&main).expect("parse");

    assert_eq!(cfg.fetch_opt("from_sub").as_deref(), Some("yes"));
    assert_eq!(cfg.fetch_opt("from_opt").as_deref(), Some("yes"));
}

#[test]
fn test_missing_mandatory_include_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let main = write(dir.path(), "main.conf", "include=/nonexistent/sub.conf\n");

    let cfg = ConfigFile::new();
    assert!(cfg.parse_config(&main).is_err());
}

#[test]
fn test_opt_override_replaces_after_parent() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "site.conf", "log_prefix=/srv/logs\n");

    let main = write(
        dir.path(),
        "main.conf",
        &format!(
            "log_prefix=/tmp\nopt_override={}\nafter_override=still_parsed\n",
            dir.path().join("site.conf").display()
        ),
    );

    let cfg = ConfigFile::new();
    cfg.parse_config(&main).expect("parse");

    // override wins even though the parent line came later in the file
    assert_eq!(cfg.fetch_opt("log_prefix").as_deref(), Some("/srv/logs"));
    assert_eq!(cfg.fetch_opt("after_override").as_deref(), Some("still_parsed"));
}

#[test]
fn test_opt_override_appends_when_all_append() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "extra.conf", "source+=wlan9\n");

    let main = write(
        dir.path(),
        "main.conf",
        &format!(
            "source=wlan0\nopt_override={}\n",
            dir.path().join("extra.conf").display()
        ),
    );

    let cfg = ConfigFile::new();
    cfg.parse_config(&main).expect("parse");

    assert_eq!(cfg.fetch_opt_vec("source"), vec!["wlan0", "wlan9"]);
}

#[test]
fn test_template_expansion() {
    let cfg = ConfigFile::new();
    cfg.set_paths(ConfigPaths {
        log_prefix: "/srv/logs".into(),
        home_dir: "/home/op".into(),
        data_dir: "/usr/share/ws".into(),
        etc_dir: "/etc/ws".into(),
        bin_dir: "/usr/bin".into(),
    });

    let out = cfg.process_log_template("%p%n-%l", "survey", "pcapng", 0);
    assert_eq!(out, "/srv/logs/survey-pcapng");

    let home = cfg.process_log_template("%h/.kismet/session.db", "", "", 0);
    assert_eq!(home, "/home/op/.kismet/session.db");

    let padded = cfg.process_log_template("cap-%I.pcapng", "", "", 42);
    assert_eq!(padded, "cap-000042.pcapng");
}

#[test]
#[serial]
fn test_incremental_path_skips_existing_and_compressed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = ConfigFile::new();
    cfg.set_paths(ConfigPaths {
        log_prefix: dir.path().display().to_string(),
        ..Default::default()
    });

    // occupy iteration 1 directly and iteration 2 via a .gz sibling
    fs::write(dir.path().join("net-1.pcapng"), b"x").expect("seed");
    fs::write(dir.path().join("net-2.pcapng.gz"), b"x").expect("seed");

    // %p carries its own trailing slash
    let path = cfg
        .expand_log_path("%pnet-%i.pcapng", "net", "pcapng", 1, false)
        .expect("expand");

    assert_eq!(path, dir.path().join("net-3.pcapng"));
}

#[test]
fn test_checksum_tracks_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(dir.path(), "a.conf", "alpha=1\n");

    let cfg = ConfigFile::new();
    cfg.parse_config(&path).expect("parse");
    let before = cfg.checksum();
    assert_ne!(before, 0);

    cfg.set_opt("alpha", "2");
    assert_ne!(cfg.checksum(), before);
}
