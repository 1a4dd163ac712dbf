//! End-to-end scenarios exercising the public library surface against real
//! on-disk triplets: building a base archive, applying overlays through
//! `EngineConfig`, and (for the Interceptor) routing opens/reads through
//! `engine::Interceptor` against `NativeOsFileApi`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqvoe::config::{ArchiveTripletConfig, EngineConfig, TtmpPackConfig};
use sqvoe::engine::{Interceptor, NativeOsFileApi, RoutedHandle, Triplet, TripletConfigFactory};
use sqvoe::pathspec::PathSpec;
use sqvoe::provider::EntryProvider;
use sqvoe::sqpack::creator::{Creator, CreatorLimits};
use sqvoe::sqpack::locator::DataLocator;
use sqvoe::sqpack::reader::SqpackReader;
use sqvoe::stream::RandomAccessStream;
use sqvoe::views::SqpackViews;
use tempfile::tempdir;

fn write_stream(stream: &dyn RandomAccessStream, path: &Path) {
    let mut out = Vec::new();
    let mut offset = 0u64;
    let mut buf = [0u8; 65536];
    loop {
        let n = stream.read_partial(offset, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
        offset += n as u64;
    }
    std::fs::write(path, out).unwrap();
}

/// Builds a real triplet on disk under `dir/expac/name.win32.*` from a set
/// of `(path, bytes)` pairs, each encoded as a `MemoryBinary` entry.
fn write_base_triplet(
    dir: &Path,
    expac: &str,
    name: &str,
    entries: &[(&str, &[u8])],
) -> ArchiveTripletConfig {
    let archive_dir = dir.join(expac);
    std::fs::create_dir_all(&archive_dir).unwrap();

    let mut creator = Creator::new(CreatorLimits::default());
    for (path, data) in entries {
        let spec = PathSpec::from_path(path);
        let provider = EntryProvider::MemoryBinary(Arc::new(data.to_vec()));
        creator.add_entry(spec, provider, true).unwrap();
    }
    let views = creator.freeze().unwrap();
    write_triplet_files(&archive_dir, name, &views)
}

fn write_triplet_files(archive_dir: &Path, name: &str, views: &SqpackViews) -> ArchiveTripletConfig {
    std::fs::create_dir_all(archive_dir).unwrap();
    let index_path = archive_dir.join(format!("{name}.win32.index"));
    let index2_path = archive_dir.join(format!("{name}.win32.index2"));
    write_stream(views.index.as_ref(), &index_path);
    write_stream(views.index2.as_ref(), &index2_path);

    let mut data_paths = Vec::new();
    for (i, span) in views.data_spans.iter().enumerate() {
        let p = archive_dir.join(format!("{name}.win32.dat{i}"));
        write_stream(span.as_ref(), &p);
        data_paths.push(p);
    }

    ArchiveTripletConfig {
        label: format!(
            "{}/{name}",
            archive_dir.file_name().unwrap().to_string_lossy()
        ),
        index_path,
        index2_path,
        data_paths,
    }
}

fn config_with_no_overlays(base: ArchiveTripletConfig) -> EngineConfig {
    EngineConfig {
        base_archive: base,
        archive_roots: Vec::new(),
        excel_roots: Vec::new(),
        ttmp_packs: Vec::new(),
        loose_file_roots: Vec::new(),
        font_tables: Vec::new(),
        max_file_size: None,
        additional_modpack_directories: Vec::new(),
        use_default_modpack_dir: false,
        additional_loose_root_directories: Vec::new(),
        use_default_loose_root_directory: false,
        cache_dir: PathBuf::new(),
        config_dir: None,
    }
}

fn find_locator(reader: &SqpackReader, spec: &PathSpec) -> Option<DataLocator> {
    let (path_hash, name_hash) = spec.index_key();
    reader
        .two_hash_entries
        .iter()
        .find(|e| e.path_hash == path_hash && e.name_hash == name_hash)
        .map(|e| e.locator)
}

/// Writes a frozen `SqpackViews` to `dir/merged/{name}.win32.*` and reopens
/// it as a `SqpackReader`, the way a diagnostic CLI would.
fn reopen_merged(dir: &Path, name: &str, views: SqpackViews) -> SqpackReader {
    let merged_dir = dir.join("merged");
    let config = write_triplet_files(&merged_dir, name, &views);
    SqpackReader::open(&config.index_path, &config.index2_path, &config.data_paths).unwrap()
}

/// §8 scenario 1: an acquisition with no overlay contribution never
/// produces a views set; re-running reports the same outcome.
#[test]
fn pass_through_with_no_overlay_contribution() {
    let dir = tempdir().unwrap();
    let base = write_base_triplet(dir.path(), "ffxiv", "0a0000", &[("a/b.bin", b"base content")]);
    let config = config_with_no_overlays(base);

    assert!(config.build_if_contributing().unwrap().is_none());
    assert!(config.build_if_contributing().unwrap().is_none());
}

/// §8 scenario 2: a loose-file overlay replaces an existing entry; reading
/// it back through the merged view returns the override's content.
#[test]
fn loose_overlay_replaces_existing_entry() {
    let dir = tempdir().unwrap();
    let base = write_base_triplet(dir.path(), "ffxiv", "0a0000", &[("a/b.tex", b"original texture bytes")]);

    let loose_root = dir.path().join("loose");
    std::fs::create_dir_all(loose_root.join("a")).unwrap();
    std::fs::write(loose_root.join("a/b.tex"), b"overridden texture bytes").unwrap();

    let mut config = config_with_no_overlays(base);
    config.loose_file_roots = vec![loose_root];

    let views = config.build().unwrap();
    let reopened = reopen_merged(dir.path(), "0a0000", views);

    let spec = PathSpec::from_path("a/b.tex");
    let locator = find_locator(&reopened, &spec).expect("override entry must be present");
    let content = reopened.read_entry(locator).unwrap();
    assert_eq!(content, b"overridden texture bytes");
}

/// §8 scenario 3: a TTMP overlay introduces a path absent from the base
/// archive; both index forms carry the new key and the base entry survives
/// untouched.
#[test]
fn ttmp_overlay_introduces_new_entry() {
    let dir = tempdir().unwrap();
    let base = write_base_triplet(dir.path(), "ffxiv", "0a0000", &[("a/existing.bin", b"untouched")]);

    let mpd_path = dir.path().join("TTMPD.mpd");
    let mpl_path = dir.path().join("TTMPL.mpl");
    let payload = sqvoe::sqpack::entry::encode_binary_entry(b"brand new entry").unwrap();
    std::fs::write(&mpd_path, &payload).unwrap();
    std::fs::write(
        &mpl_path,
        format!(
            r#"{{"FullPath": "c/d.bin", "ModOffset": 0, "ModSize": {}}}"#,
            payload.len()
        ),
    )
    .unwrap();

    let mut config = config_with_no_overlays(base);
    config.ttmp_packs = vec![TtmpPackConfig {
        label: "new-entry-pack".into(),
        mpl_path,
        mpd_path,
    }];

    let views = config.build().unwrap();
    let reopened = reopen_merged(dir.path(), "0a0000", views);

    assert!(find_locator(&reopened, &PathSpec::from_path("a/existing.bin")).is_some());
    let new_locator =
        find_locator(&reopened, &PathSpec::from_path("c/d.bin")).expect("new entry must be present");
    assert_eq!(reopened.read_entry(new_locator).unwrap(), b"brand new entry");
}

/// §8 scenario 4: a configured external archive root whose triplet is
/// absent from disk is skipped rather than erroring, and contributes
/// nothing to the merge.
#[test]
fn external_root_with_no_match_does_not_contribute() {
    let dir = tempdir().unwrap();
    let base = write_base_triplet(dir.path(), "ffxiv", "0a0000", &[("a/b.bin", b"base content")]);

    let missing_root = dir.path().join("nonexistent").join("0c0000");
    let mut config = config_with_no_overlays(base);
    config.archive_roots = vec![ArchiveTripletConfig {
        label: "missing-root".into(),
        index_path: missing_root.join("0c0000.win32.index"),
        index2_path: missing_root.join("0c0000.win32.index2"),
        data_paths: vec![missing_root.join("0c0000.win32.dat0")],
    }];

    assert!(config.build_if_contributing().unwrap().is_none());
}

/// An overlay set that contributes nothing still blacklists the triplet,
/// even with overlay categories configured but empty.
#[test]
fn empty_overlay_categories_do_not_contribute() {
    let dir = tempdir().unwrap();
    let base = write_base_triplet(dir.path(), "ffxiv", "0a0000", &[("a/b.bin", b"base content")]);

    let empty_loose_root = dir.path().join("empty-loose-root");
    std::fs::create_dir_all(&empty_loose_root).unwrap();

    let mut config = config_with_no_overlays(base);
    config.loose_file_roots = vec![empty_loose_root];

    assert!(config.build_if_contributing().unwrap().is_none());
}

/// §8 scenario 5 (shape): concurrent overlapped-style reads against one
/// intercepted handle never touch the stored cursor, and each returns
/// exactly its requested byte count for non-overlapping ranges.
#[test]
fn concurrent_overlapped_reads_leave_cursor_untouched() {
    let dir = tempdir().unwrap();
    let entries: Vec<(&str, &[u8])> = vec![("a/b.bin", &[0x42u8; 4096])];
    let _base = write_base_triplet(dir.path(), "ffxiv", "0a0000", &entries);

    let loose_root = dir.path().join("loose");
    std::fs::create_dir_all(loose_root.join("a")).unwrap();
    std::fs::write(loose_root.join("a/b.bin"), [0x42u8; 4096]).unwrap();

    struct Factory {
        loose_root: PathBuf,
    }
    impl TripletConfigFactory for Factory {
        fn build_config(&self, triplet: &Triplet) -> EngineConfig {
            EngineConfig {
                base_archive: ArchiveTripletConfig {
                    label: format!("{}/{}", triplet.expac, triplet.name),
                    index_path: triplet.index_path.clone(),
                    index2_path: triplet.index2_path.clone(),
                    data_paths: triplet.data_paths.clone(),
                },
                archive_roots: Vec::new(),
                excel_roots: Vec::new(),
                ttmp_packs: Vec::new(),
                loose_file_roots: vec![self.loose_root.clone()],
                font_tables: Vec::new(),
                max_file_size: None,
                additional_modpack_directories: Vec::new(),
                use_default_modpack_dir: false,
                additional_loose_root_directories: Vec::new(),
                use_default_loose_root_directory: false,
                cache_dir: PathBuf::new(),
                config_dir: None,
            }
        }
    }

    let interceptor = Arc::new(Interceptor::new(
        NativeOsFileApi,
        dir.path().to_path_buf(),
        Box::new(Factory { loose_root }),
    ));

    let index_path = dir.path().join("ffxiv").join("0a0000.win32.index");
    let opened = interceptor.open(&index_path, true, true, false).unwrap();
    assert!(matches!(opened, RoutedHandle::Intercepted(_)));
    let handle = Arc::new(opened);

    const FILE_CURRENT: u32 = 1;
    let cursor_before = interceptor.seek(&handle, FILE_CURRENT, 0).unwrap();

    let mut threads = Vec::new();
    for i in 0..8u64 {
        let interceptor = interceptor.clone();
        let handle = handle.clone();
        threads.push(std::thread::spawn(move || {
            let mut buf = vec![0u8; 16];
            let n = interceptor.read(&handle, Some(i * 16), &mut buf).unwrap();
            assert_eq!(n, 16);
        }));
    }
    for t in threads {
        t.join().unwrap();
    }

    let cursor_after = interceptor.seek(&handle, FILE_CURRENT, 0).unwrap();
    assert_eq!(cursor_before, cursor_after);
}
