//! Integration tests for the py2cfg binary

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// The binary with its config file and log directory kept inside `home`
fn py2cfg_cmd(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("py2cfg");
    cmd.env("HOME", home);
    cmd.env("PY2CFG_CONFIG", home.join("py2cfg.toml"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_package(dir: &Path, setup_py: &str) -> std::io::Result<PathBuf> {
    let path = dir.join("setup.py");
    fs::write(&path, setup_py)?;
    Ok(path)
}

#[test]
fn test_version() -> TestResult {
    let home = TempDir::new()?;
    py2cfg_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("py2cfg"));
    Ok(())
}

#[test]
fn test_help() -> TestResult {
    let home = TempDir::new()?;
    py2cfg_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dangling-list-threshold"))
        .stdout(predicate::str::contains("--never-use-dangling-lists"));
    Ok(())
}

#[test]
fn test_full_package() -> TestResult {
    let home = TempDir::new()?;
    let expected = "\
[metadata]
name = ansimarkup
version = 1.4.0
author = Georgi Valkov
author_email = georgi.t.valkov@gmail.com
license = Revised BSD License
description = Produce colored terminal text with an xml-like markup
keywords = ansi, terminal, markup
url = https://github.com/gvalkov/python-ansimarkup
project_urls =
    Repo = https://github.com/gvalkov/setuptools-py2cfg
long_description = file: README.rst
classifiers =
    Development Status :: 5 - Production/Stable
    Programming Language :: Python :: 2.7
    Programming Language :: Python :: 3
    Programming Language :: Python :: 3.3
    Programming Language :: Python :: 3.4
    Programming Language :: Python :: 3.5
    Programming Language :: Python :: 3.6
    Intended Audience :: Developers
    Topic :: Software Development :: Libraries
    License :: OSI Approved :: BSD License

[options]
packages = find:
package_dir =
    = src1
    a = src2
zip_safe = True
install_requires = colorama

[options.extras_require]
tests = tox >= 2.6.0; pytest >= 3.0.3; pytest-cov >= 2.3.1
devel = bumpversion >= 0.5.2; check-manifest >= 0.35; readme-renderer >= 16.0; flake8; pep8-naming

[options.packages.find]
where = src1
exclude = tests; unneeded
";

    py2cfg_cmd(home.path())
        .arg(fixture("testpkg1").join("setup.py"))
        .assert()
        .success()
        .stdout(predicate::eq(expected));
    Ok(())
}

#[test]
fn test_name_and_version_only() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;
    let setup_py = write_package(
        pkg.path(),
        "from setuptools import setup\nsetup(name='foo', version='1.0.0')\n",
    )?;

    py2cfg_cmd(home.path())
        .arg(&setup_py)
        .assert()
        .success()
        .stdout(predicate::eq("[metadata]\nname = foo\nversion = 1.0.0\n"));
    Ok(())
}

#[test]
fn test_default_path_is_current_directory() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;
    write_package(pkg.path(), "import setuptools\nsetuptools.setup(name='here')\n")?;

    py2cfg_cmd(home.path())
        .current_dir(pkg.path())
        .assert()
        .success()
        .stdout(predicate::eq("[metadata]\nname = here\n"));
    Ok(())
}

#[test]
fn test_merges_existing_setup_cfg() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;
    fs::write(
        pkg.path().join("setup.cfg"),
        "[options]\ninstall_requires=python-dateutil\n",
    )?;
    let setup_py = write_package(
        pkg.path(),
        "from setuptools import setup, find_packages\nsetup(packages=find_packages())\n",
    )?;

    py2cfg_cmd(home.path())
        .arg(&setup_py)
        .assert()
        .success()
        .stdout(predicate::eq(
            "[options]\ninstall_requires = python-dateutil\npackages = find:\n",
        ));

    py2cfg_cmd(home.path())
        .arg("--no-merge")
        .arg(&setup_py)
        .assert()
        .success()
        .stdout(predicate::eq("[options]\npackages = find:\n"));
    Ok(())
}

#[test]
fn test_dangling_list_flags() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;
    let setup_py = write_package(
        pkg.path(),
        "from setuptools import setup\nsetup(install_requires=['click', 'attrs'])\n",
    )?;

    py2cfg_cmd(home.path())
        .args(["-a", "-i", "2"])
        .arg(&setup_py)
        .assert()
        .success()
        .stdout(predicate::eq("[options]\ninstall_requires =\n  click\n  attrs\n"));

    py2cfg_cmd(home.path())
        .args(["-t", "5"])
        .arg(&setup_py)
        .assert()
        .success()
        .stdout(predicate::str::contains("install_requires =\n    click\n    attrs"));
    Ok(())
}

#[test]
fn test_config_file_sets_defaults() -> TestResult {
    let home = TempDir::new()?;
    fs::copy(fixture("py2cfg.toml"), home.path().join("py2cfg.toml"))?;
    let pkg = TempDir::new()?;
    let setup_py = write_package(
        pkg.path(),
        "from setuptools import setup\nsetup(classifiers=['A :: B'])\n",
    )?;

    py2cfg_cmd(home.path())
        .arg(&setup_py)
        .assert()
        .success()
        .stdout(predicate::eq("[metadata]\nclassifiers =\n  A :: B\n"));

    py2cfg_cmd(home.path())
        .args(["-i", "8"])
        .arg(&setup_py)
        .assert()
        .success()
        .stdout(predicate::eq("[metadata]\nclassifiers =\n        A :: B\n"));
    Ok(())
}

#[test]
fn test_conflicting_dangling_flags() -> TestResult {
    let home = TempDir::new()?;
    py2cfg_cmd(home.path())
        .args(["-a", "-n", "setup.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));

    py2cfg_cmd(home.path())
        .args(["-t", "10", "-n", "setup.py"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_setup_not_called() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;
    let setup_py = write_package(pkg.path(), "import setuptools\nNAME = 'foo'\n")?;

    py2cfg_cmd(home.path())
        .arg(&setup_py)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("setup() was never called"));
    Ok(())
}

#[test]
fn test_script_error_fails_without_output() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;
    let setup_py = write_package(
        pkg.path(),
        "from setuptools import setup\nsetup(name=NAME)\n",
    )?;

    py2cfg_cmd(home.path())
        .arg(&setup_py)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("NameError: name 'NAME' is not defined"));
    Ok(())
}

#[test]
fn test_missing_script() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;

    py2cfg_cmd(home.path())
        .arg(pkg.path().join("setup.py"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
    Ok(())
}

#[test]
fn test_field_errors_are_warnings() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;
    let setup_py = write_package(
        pkg.path(),
        "from setuptools import setup\nsetup(name='foo', install_requires={'a': 'b'})\n",
    )?;

    py2cfg_cmd(home.path())
        .arg(&setup_py)
        .assert()
        .success()
        .stdout(predicate::eq("[metadata]\nname = foo\n"))
        .stderr(predicate::str::contains("install_requires: expected"));

    py2cfg_cmd(home.path())
        .arg("--quiet")
        .arg(&setup_py)
        .assert()
        .success()
        .stderr(predicate::str::contains("install_requires").not());
    Ok(())
}

#[test]
fn test_show_arguments() -> TestResult {
    let home = TempDir::new()?;
    let pkg = TempDir::new()?;
    let setup_py = write_package(
        pkg.path(),
        "from setuptools import setup, find_packages\nsetup(name='foo', zip_safe=False, packages=find_packages('src'))\n",
    )?;

    let output = py2cfg_cmd(home.path())
        .arg("--show-arguments")
        .arg(&setup_py)
        .output()?;
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["name"], "foo");
    assert_eq!(json["zip_safe"], false);
    assert_eq!(json["packages"]["discover"], "find:");
    assert_eq!(json["packages"]["arguments"]["where"], "src");
    Ok(())
}
