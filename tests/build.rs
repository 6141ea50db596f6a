// tests/build.rs

//! End-to-end package builds driven by manifests.

mod common;

use common::{FakeLister, Workspace, CORE_MANIFEST, PLATFORM};
use packsmith::archive::Multifile;
use packsmith::contents::ContentsDocument;
use packsmith::descriptor::{ImportDescriptor, PackageDescriptor, APP_MANIFEST_ENTRY};
use packsmith::modules::freezer::RUNTIME_HEADER;
use packsmith::modules::FROZEN_MODULES_ENTRY;
use packsmith::{Error, PackageKind};
use std::fs;

#[test]
fn test_application_build() {
    let ws = Workspace::new();
    ws.write("core.txt", "runtime");
    ws.write("main.py", "print('hello')\n");

    let mut packager = ws.packager();
    ws.run(&mut packager, CORE_MANIFEST).unwrap();
    ws.run(
        &mut packager,
        r#"
[[package]]
name = "app1"
type = "application"
steps = [
    { file = "main.py" },
    { main_module = "main" },
]
"#,
    )
    .unwrap();
    let built = packager.finish().unwrap();

    let app = built.iter().find(|p| p.name == "app1").unwrap();
    assert_eq!(app.kind, PackageKind::Application);
    assert_eq!(app.path, ws.out.join("app1.p3d"));

    let archive = Multifile::open_read(&app.path).unwrap();
    assert_eq!(archive.header_prefix(), Some(RUNTIME_HEADER));
    let names = archive.entry_names();
    assert!(names.contains(&FROZEN_MODULES_ENTRY));
    assert!(names.contains(&APP_MANIFEST_ENTRY));

    let descriptor = PackageDescriptor::from_file(&ws.out.join("app1.toml")).unwrap();
    assert!(descriptor.uncompressed_archive.filename.ends_with("app1.p3d"));
    assert!(descriptor.compressed_archive.is_some());
    assert!(descriptor.base_version.is_none());
    assert_eq!(descriptor.requires.len(), 1);
    assert_eq!(descriptor.requires[0].name, "core");
    assert_eq!(descriptor.requires[0].version.as_deref(), Some("1.0"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&app.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    // Applications are not listed in the contents index
    let contents = ContentsDocument::parse(&fs::read_to_string(ws.out.join("contents.toml")).unwrap()).unwrap();
    let listed: Vec<_> = contents.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(listed, vec!["core"]);
    assert_eq!(contents.descriptive_name.as_deref(), Some("Example Packages"));
}

#[test]
fn test_application_needs_main_module() {
    let ws = Workspace::new();
    ws.write("core.txt", "runtime");
    ws.write("main.py", "print('hello')\n");

    let mut packager = ws.packager();
    ws.run(&mut packager, CORE_MANIFEST).unwrap();
    let err = ws
        .run(
            &mut packager,
            "[[package]]\nname = \"app1\"\ntype = \"application\"\nsteps = [\n  { file = \"main.py\" },\n]\n",
        )
        .unwrap_err();
    assert!(err.is_fatal_for_package());
    assert!(!ws.out.join("app1.p3d").exists());
}

#[test]
fn test_shared_library_makes_package_platform_specific() {
    let ws = Workspace::new();
    ws.write("libgame.so", b"\x7fELF");
    ws.write("libphysics.so", b"\x7fELF");

    let lister = FakeLister::default()
        .with("libgame.so", &["libphysics.so", "libc.so.6"])
        .with("libphysics.so", &[]);
    let mut packager = ws.packager_with(ws.config(), lister);
    ws.run(
        &mut packager,
        "[[package]]\nname = \"native\"\nsteps = [\n  { file = \"libgame.so\" },\n]\n",
    )
    .unwrap();
    let built = packager.finish().unwrap();

    assert_eq!(built[0].platform.as_deref(), Some(PLATFORM));
    let dir = ws.out.join("native").join(PLATFORM);
    assert_eq!(built[0].path, dir.join(format!("native.{}.mf", PLATFORM)));

    let import =
        ImportDescriptor::from_file(&dir.join(format!("native.{}.import.toml", PLATFORM))).unwrap();
    let components: Vec<_> = import.components.iter().map(|c| c.filename.as_str()).collect();
    assert_eq!(components, vec!["libgame.so", "libphysics.so"]);
}

#[test]
fn test_platform_specific_override() {
    let ws = Workspace::new();
    ws.write("libgame.so", b"\x7fELF");
    let built = ws
        .build(
            r#"
[[package]]
name = "native"
steps = [
    { config = { platform_specific = false } },
    { file = "libgame.so" },
]
"#,
        )
        .unwrap();
    assert_eq!(built[0].platform, None);
    assert!(built[0].path.ends_with("native/native.mf"));

    let descriptor = PackageDescriptor::from_file(&ws.out.join("native/native.toml")).unwrap();
    assert!(!descriptor.config.contains_key("platform_specific"));
}

#[test]
fn test_explicit_file_survives_exclusion() {
    let ws = Workspace::new();
    ws.write("readme.txt", "read me");
    ws.write("extra/notes.txt", "notes");
    ws.write("extra/logo.png", b"png");

    let built = ws
        .build(
            r#"
[[package]]
name = "docs"
steps = [
    { exclude = "*.txt" },
    { file = "readme.txt" },
    { dir = "extra" },
]
"#,
        )
        .unwrap();

    let archive = Multifile::open_read(&built[0].path).unwrap();
    let mut names = archive.entry_names();
    names.sort();
    assert_eq!(names, vec!["logo.png", "readme.txt"]);
}

#[test]
fn test_requirement_modules_are_skipped() {
    let ws = Workspace::new();
    ws.write("a/foo.py", "VALUE = 1\n");
    ws.write("b/bar.py", "import foo\n");

    let mut packager = ws.packager();
    ws.run(
        &mut packager,
        r#"
[[package]]
name = "A"
steps = [
    { file = "a/foo.py", new_name = "foo.py" },
]
"#,
    )
    .unwrap();
    assert_eq!(packager.built()[0].modules, vec!["foo"]);

    packager.begin_package("B", PackageKind::Library).unwrap();
    packager.require(&["A".to_string()], None, None).unwrap();
    packager
        .file(&packsmith::manifest::FileDirective {
            names: vec!["b/bar.py".to_string()],
            new_name: Some("bar.py".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert!(packager.current_package().unwrap().modules.is_skipped("foo"));
    let b = packager.end_package().unwrap().unwrap();
    assert_eq!(b.modules, vec!["bar"]);

    let import = ImportDescriptor::from_file(&ws.out.join("B/B.import.toml")).unwrap();
    assert_eq!(import.requires.len(), 1);
    assert_eq!(import.requires[0].name, "A");
    assert!(import.modules.iter().all(|m| m.name != "foo"));
}

#[test]
fn test_solo_package() {
    let ws = Workspace::new();
    ws.write("plugin.txt", "payload");
    let built = ws
        .build(
            r#"
[[package]]
name = "plugin"
type = "solo"
steps = [
    { config = { version = "3" } },
    { file = "plugin.txt" },
]
"#,
        )
        .unwrap();

    assert_eq!(built[0].path, ws.out.join("plugin/3/plugin.txt"));
    assert_eq!(fs::read_to_string(&built[0].path).unwrap(), "payload");

    let contents = ContentsDocument::parse(&fs::read_to_string(ws.out.join("contents.toml")).unwrap()).unwrap();
    assert!(contents.packages[0].solo);
    assert!(contents.packages[0].import_file.is_none());
}

#[test]
fn test_rebuild_preserves_base_archive() {
    let ws = Workspace::new();
    ws.write("readme.txt", "first");
    let manifest = r#"
[[package]]
name = "docs"
steps = [
    { config = { version = "2" } },
    { file = "readme.txt" },
]
"#;
    ws.build(manifest).unwrap();
    let archive = ws.out.join("docs/2/docs.2.mf");
    let first = fs::read(&archive).unwrap();
    assert!(!ws.out.join("docs/2/docs.2.mf.base").exists());

    ws.write("readme.txt", "second");
    ws.build(manifest).unwrap();

    let base = ws.out.join("docs/2/docs.2.mf.base");
    assert_eq!(fs::read(&base).unwrap(), first);
    let descriptor = PackageDescriptor::from_file(&ws.out.join("docs/2/docs.2.toml")).unwrap();
    assert!(descriptor.base_version.is_some());
    assert_eq!(descriptor.version.as_deref(), Some("2"));
    assert!(!descriptor.config.contains_key("version"));
}

#[test]
fn test_statement_outside_package() {
    let ws = Workspace::new();
    let mut packager = ws.packager();
    let err = packager.exclude("*.txt").unwrap_err();
    assert!(matches!(err, Error::OutsideOfPackage(_)));
}
