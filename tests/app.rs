mod support;

use std::sync::Arc;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use moth_catalog::app::{App, EntryOutcome};
use moth_catalog::assets::FolderCache;
use moth_catalog::catalog::Removal;
use moth_catalog::domain::{Gender, Stage};
use moth_catalog::error::CatalogError;
use moth_catalog::export::EXPORT_HEADERS;
use moth_catalog::store::{IMPORT_HISTORY_LIMIT, StorageKey, Store};

use support::{MockDrive, RecordingSink, utf8_tempdir, write_png};

const SAMPLE: &str = include_str!("fixtures/taicol_sample.csv");

fn app_in(root: &Utf8PathBuf, drive: MockDrive) -> App<MockDrive> {
    let store = Store::new_with_root(root.join("data"));
    App::new(store, drive, Arc::new(FolderCache::new()))
}

#[test]
fn import_replaces_index_and_records_history() {
    let (_dir, root) = utf8_tempdir();
    let app = app_in(&root, MockDrive::default());
    let sink = RecordingSink::default();

    let csv_path = root.join("taicol.csv");
    std::fs::write(&csv_path, SAMPLE).unwrap();
    let result = app.import_reference(&csv_path, &sink).unwrap();
    assert_eq!(result.filename, "taicol.csv");
    assert_eq!(result.accepted, 3);
    assert_eq!(result.skipped_not_accepted, 1);
    assert_eq!(result.skipped_malformed, 1);

    let search = app.search("attacus").unwrap();
    assert_eq!(search.indexed, 3);
    assert_eq!(search.results.len(), 1);

    let history = app.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].count, 3);
    assert_eq!(history[0].id, result.record_id);

    let replacement = "taxon_id,usage_status,simple_name,family,genus\n\
                       x1,accepted,Samia wangi,Saturniidae,Samia\n";
    app.import_text("second.csv", replacement, &sink).unwrap();
    assert!(app.search("attacus").unwrap().results.is_empty());
    assert_eq!(app.history().unwrap()[0].filename, "second.csv");
}

#[test]
fn import_without_accepted_rows_keeps_current_index() {
    let (_dir, root) = utf8_tempdir();
    let app = app_in(&root, MockDrive::default());
    let sink = RecordingSink::default();
    app.import_text("good.csv", SAMPLE, &sink).unwrap();

    let only_synonyms = "taxon_id,usage_status,simple_name\n1,not-accepted,Foo bar\n";
    let err = app.import_text("bad.csv", only_synonyms, &sink).unwrap_err();
    assert_matches!(err, CatalogError::NoValidRows(name) if name == "bad.csv");

    assert_eq!(app.search("attacus").unwrap().results.len(), 1);
    assert_eq!(app.history().unwrap().len(), 1);
}

#[test]
fn history_keeps_most_recent_imports() {
    let (_dir, root) = utf8_tempdir();
    let app = app_in(&root, MockDrive::default());
    let sink = RecordingSink::default();

    for round in 0..IMPORT_HISTORY_LIMIT + 2 {
        app.import_text(&format!("import-{round}.csv"), SAMPLE, &sink)
            .unwrap();
    }

    let history = app.history().unwrap();
    assert_eq!(history.len(), IMPORT_HISTORY_LIMIT);
    assert_eq!(history[0].filename, format!("import-{}.csv", IMPORT_HISTORY_LIMIT + 1));
    assert_eq!(history.last().unwrap().filename, "import-2.csv");
}

#[test]
fn entry_lifecycle() {
    let (_dir, root) = utf8_tempdir();
    let app = app_in(&root, MockDrive::default());
    app.import_text("taicol.csv", SAMPLE, &RecordingSink::default())
        .unwrap();

    assert_matches!(app.create_entry("t9999"), Err(CatalogError::TaxonNotFound(_)));

    let created = app.create_entry("t0001").unwrap();
    assert_eq!(created.outcome, EntryOutcome::Created);
    let code = created.entry.entry_code.clone();
    assert!(code.is_some());

    let reopened = app.create_entry("t0001").unwrap();
    assert_eq!(reopened.outcome, EntryOutcome::Existing);
    assert_eq!(reopened.entry.entry_code, code);

    let noted = app.update_notes("t0001", "reared from egg").unwrap();
    assert_eq!(noted.notes, "reared from egg");
    assert_eq!(noted.entry_code, code);

    let set = app.add_photo_set("t0001", Stage::Egg).unwrap();
    app.set_inat_link("t0001", Stage::Egg, &set.set_id, "https://inat/1")
        .unwrap();
    assert_eq!(app.show_entry("t0001").unwrap().stages.egg[0].inat_link, "https://inat/1");

    assert_eq!(
        app.delete_photo_set("t0001", Stage::Egg, &set.set_id).unwrap(),
        Removal::Removed { photos_discarded: 0 }
    );
    assert_eq!(
        app.delete_photo_set("t0001", Stage::Egg, &set.set_id).unwrap(),
        Removal::NotFound
    );
    assert_eq!(
        app.delete_photo_set("t0404", Stage::Egg, "any").unwrap(),
        Removal::NotFound
    );

    assert_eq!(app.list_entries("atlas").unwrap().entries.len(), 1);
    assert!(app.delete_entry("t0001").unwrap().is_removed());
    assert_eq!(app.delete_entry("t0001").unwrap(), Removal::NotFound);
    assert_matches!(app.show_entry("t0001"), Err(CatalogError::EntryNotFound(_)));
}

#[tokio::test]
async fn attach_requires_root_folder() {
    let (_dir, root) = utf8_tempdir();
    let app = app_in(&root, MockDrive::default());
    app.import_text("taicol.csv", SAMPLE, &RecordingSink::default())
        .unwrap();
    app.create_entry("t0001").unwrap();
    let set = app.add_photo_set("t0001", Stage::Adult).unwrap();
    let photo = write_png(&root, "atlas.png", 5, 5);

    let err = app
        .attach_photos("t0001", Stage::Adult, &set.set_id, &[photo], &RecordingSink::default())
        .await
        .unwrap_err();
    assert_matches!(err, CatalogError::MissingRootFolder);
    assert_eq!(app.resolver().drive().folder_calls(), 0);
}

#[tokio::test]
async fn attach_saves_photos_and_feeds_gallery() {
    let (_dir, root) = utf8_tempdir();
    let app = app_in(&root, MockDrive::default()).persist_folder_cache(true);
    let sink = RecordingSink::default();
    app.import_text("taicol.csv", SAMPLE, &sink).unwrap();
    app.set_root_folder("  root-folder ").unwrap();
    app.create_entry("t0001").unwrap();
    let set = app.add_photo_set("t0001", Stage::Adult).unwrap();
    let photos = vec![
        write_png(&root, "male.png", 5, 5),
        write_png(&root, "female.png", 5, 5),
    ];

    let report = app
        .attach_photos("t0001", Stage::Adult, &set.set_id, &photos, &sink)
        .await
        .unwrap();
    assert_eq!(report.photos.len(), 2);
    assert!(report.folder_id.starts_with("root-folder/"));

    let entry = app.show_entry("t0001").unwrap();
    let saved = &entry.stages.adult[0].photos;
    assert_eq!(saved.len(), 2);
    app.set_gender("t0001", Stage::Adult, &set.set_id, &saved[0].id, Gender::Male)
        .unwrap();
    app.set_gender("t0001", Stage::Adult, &set.set_id, &saved[1].id, Gender::Female)
        .unwrap();

    let gallery = app.gallery().unwrap();
    assert_eq!(gallery.items.len(), 1);
    let item = &gallery.items[0];
    assert_eq!(item.male.as_ref().map(|photo| photo.name.as_str()), Some("male.png"));
    assert_eq!(item.female.as_ref().map(|photo| photo.name.as_str()), Some("female.png"));
    assert_eq!(
        item.representative.as_ref().map(|photo| photo.name.as_str()),
        Some("male.png")
    );

    let stats = app.stats().unwrap();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.photo_sets, 1);
    assert_eq!(stats.photos, 2);
    assert_eq!(stats.indexed_taxa, 3);

    assert_eq!(app.store().load_folder_cache().unwrap().len(), 4);

    let removal = app
        .remove_photo("t0001", Stage::Adult, &set.set_id, &saved[1].id)
        .unwrap();
    assert!(removal.is_removed());
    assert!(app.gallery().unwrap().items[0].female.is_none());
}

#[test]
fn export_is_sorted_taxonomically() {
    let (_dir, root) = utf8_tempdir();
    let app = app_in(&root, MockDrive::default());
    app.import_text("taicol.csv", SAMPLE, &RecordingSink::default())
        .unwrap();
    app.create_entry("t0001").unwrap();
    app.create_entry("t0004").unwrap();
    app.create_entry("t0003").unwrap();
    let set = app.add_photo_set("t0003", Stage::Larva).unwrap();
    app.set_inat_link("t0003", Stage::Larva, &set.set_id, "https://inat/7")
        .unwrap();

    let out = root.join("out/checklist.csv");
    let result = app.export_to(&out).unwrap();
    assert_eq!(result.rows, 3);

    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.starts_with("\u{feff}".as_bytes()));
    let mut reader = csv::Reader::from_reader(&bytes[3..]);
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), EXPORT_HEADERS);

    let rows = reader.records().map(Result::unwrap).collect::<Vec<_>>();
    let names = rows.iter().map(|row| &row[5]).collect::<Vec<_>>();
    assert_eq!(
        names,
        ["Lemyra sp.", "Actias ningpoana ningtaiwana", "Attacus atlas"]
    );
    assert_eq!(&rows[1][8], "Larva");
    assert_eq!(&rows[1][15], "https://inat/7");
    assert_eq!(&rows[0][13], "No");
}

#[test]
fn reset_clears_every_document() {
    let (_dir, root) = utf8_tempdir();
    let app = app_in(&root, MockDrive::default());
    app.import_text("taicol.csv", SAMPLE, &RecordingSink::default())
        .unwrap();
    app.set_root_folder("root").unwrap();
    app.create_entry("t0001").unwrap();

    app.reset(&RecordingSink::default()).unwrap();

    for key in StorageKey::ALL {
        assert!(!app.store().path_for(key).as_std_path().exists());
    }
    assert_eq!(app.stats().unwrap().entries, 0);
    assert!(app.settings().unwrap().drive_root_id.is_empty());
}
