//! Directory scan and classification over a real filesystem tree

use emgrid_ingest::classify::{classify, Category};
use emgrid_ingest::orchestrator::{raster_files, scan_year_dirs};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn touch(path: &Path) {
    fs::write(path, b"").expect("fixture file");
}

fn fixture_root() -> TempDir {
    let root = TempDir::new().expect("fixture root");

    let y2020 = root.path().join("2020_emission");
    fs::create_dir(&y2020).expect("year dir");
    touch(&y2020.join("emission.p.co.tif"));
    touch(&y2020.join("emission.a.2020_nh3_extra.tif"));
    touch(&y2020.join("notes.txt"));

    let y2015 = root.path().join("2015_emission");
    fs::create_dir(&y2015).expect("year dir");
    touch(&y2015.join("emission.l.pm10.tif"));

    // Non-numeric year: skipped, never an error
    fs::create_dir(root.path().join("abc_emission")).expect("non-year dir");
    // Wrong suffix: skipped
    fs::create_dir(root.path().join("2020_vector")).expect("non-matching dir");
    // Plain file at root level: ignored by the directory scan
    touch(&root.path().join("readme.md"));

    root
}

#[test]
fn test_scan_picks_only_year_emission_dirs_oldest_first() {
    let root = fixture_root();

    let dirs = scan_year_dirs(root.path()).expect("scan");

    let years: Vec<i32> = dirs.iter().map(|(year, _)| *year).collect();
    assert_eq!(years, vec![2015, 2020]);

    let names: Vec<String> = dirs
        .iter()
        .map(|(_, path)| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["2015_emission", "2020_emission"]);
}

#[test]
fn test_raster_files_filters_on_extension() {
    let root = fixture_root();
    let y2020 = root.path().join("2020_emission");

    let files = raster_files(&y2020, "tif").expect("listing");

    let names: Vec<String> = files
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["emission.a.2020_nh3_extra.tif", "emission.p.co.tif"]
    );
}

#[test]
fn test_scanned_files_classify_to_their_leaf_keys() {
    let root = fixture_root();
    let y2020 = root.path().join("2020_emission");

    let files = raster_files(&y2020, "tif").expect("listing");
    let classified: Vec<_> = files
        .iter()
        .map(|path| classify(&path.file_name().unwrap().to_string_lossy()))
        .collect();

    // The directory holds exactly one point/co and one area/nh3 raster, the
    // legacy year-embedded name included
    assert_eq!(classified[0].category, Category::Area);
    assert_eq!(classified[0].subcategory, "nh3");
    assert_eq!(classified[1].category, Category::Point);
    assert_eq!(classified[1].subcategory, "co");
}

#[test]
fn test_empty_year_dir_yields_no_files() {
    let root = TempDir::new().expect("fixture root");
    let dir = root.path().join("2001_emission");
    fs::create_dir(&dir).expect("year dir");

    let files = raster_files(&dir, "tif").expect("listing");
    assert!(files.is_empty());
}

#[test]
fn test_missing_root_is_an_error() {
    let root = TempDir::new().expect("fixture root");
    let missing = root.path().join("does_not_exist");

    assert!(scan_year_dirs(&missing).is_err());
}
