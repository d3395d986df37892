//! Resolving documents against a scripted Visio.

mod common;

use std::path::PathBuf;

use common::{Call, FakeVisio, ScriptedPrompt, APP, WINDOW};
use pretty_assertions::assert_eq;
use visio_connect::{
    Choice, Error, FileKind, PageHandle, ResolverConfig, Resolver, Selector, SkippedEntry,
    Unattended,
};

fn three_documents(fake: &FakeVisio) -> Vec<visio_connect::DocumentInfo> {
    vec![
        fake.with_saved(r"C:\Docs\Network.vsdx"),
        fake.with_saved(r"C:\Docs\Floor Plan.vsdm"),
        fake.with_saved(r"D:\Templates\Org.vstx"),
    ]
}

#[test]
fn index_returns_nth_document_without_side_effects() {
    let fake = FakeVisio::new();
    let docs = three_documents(&fake);
    let config = ResolverConfig::default();
    let resolver = Resolver::new(&fake, &config);

    let mut kept = Vec::new();
    for (i, expected) in docs.iter().enumerate() {
        let resolved = resolver
            .resolve(&Selector::Index(i), &mut Unattended)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.document.full_name, expected.full_name);
        kept.push(resolved.document.handle);
    }
    assert_eq!(fake.opens_and_adds(), vec![]);
    assert_eq!(fake.document_count(), 3);
    assert_eq!(fake.live_documents(), kept, "unchosen documents are released");
}

#[test]
fn out_of_range_index_fails_without_opening_anything() {
    let fake = FakeVisio::new();
    three_documents(&fake);
    let config = ResolverConfig::default();
    let resolver = Resolver::new(&fake, &config);

    let err = resolver
        .resolve(&Selector::Index(3), &mut Unattended)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidIndex { index: 3, count: 3 }));
    assert_eq!(fake.opens_and_adds(), vec![]);
    assert_eq!(fake.live_documents(), vec![]);
}

#[test]
fn bind_failures_are_skipped_and_reported() {
    let fake = FakeVisio::new();
    let good = fake.with_saved(r"C:\Docs\Network.vsdx");
    fake.with_unbindable("!{00021A21-0000-0000-C000-000000000046}!Drawing3");
    fake.with_foreign(r"C:\Docs\Budget.xlsx");
    let config = ResolverConfig::default();

    let resolver = Resolver::new(&fake, &config);
    let enumeration = resolver.loaded_documents().unwrap();

    assert_eq!(
        enumeration
            .documents
            .iter()
            .map(|d| d.full_name.as_str())
            .collect::<Vec<_>>(),
        vec![good.full_name.as_str()]
    );
    assert_eq!(
        enumeration.skipped,
        vec![SkippedEntry {
            display_name: "!{00021A21-0000-0000-C000-000000000046}!Drawing3".into(),
            reason: "Automation call failed: Operation unavailable".into(),
        }]
    );
    assert!(
        !fake.calls().contains(&Call::Bind(r"C:\Docs\Budget.xlsx".into())),
        "non-Visio entries must not be bound"
    );

    resolver.release_documents(&enumeration.documents);
    assert_eq!(fake.live_documents(), vec![]);
}

#[test]
fn skipped_entries_do_not_shift_indices_of_bound_documents() {
    let fake = FakeVisio::new();
    fake.with_unbindable(r"C:\Docs\Locked.vsdx");
    let second = fake.with_saved(r"C:\Docs\Second.vsdx");
    let config = ResolverConfig::default();

    let doc = Resolver::new(&fake, &config).document_at(0).unwrap();
    assert_eq!(doc.full_name, second.full_name);
}

#[test]
fn open_file_is_found_by_normalized_path_and_not_reopened() {
    let fake = FakeVisio::new();
    let plan = fake.with_saved(r"C:\Docs\Plan.vsdx");
    let config = ResolverConfig::default();
    let resolver = Resolver::new(&fake, &config);
    let selector = Selector::File(PathBuf::from("c:/docs/plan.VSDX"));

    let first = resolver.resolve(&selector, &mut Unattended).unwrap().unwrap();
    let second = resolver.resolve(&selector, &mut Unattended).unwrap().unwrap();

    assert_eq!(first.document.key(), plan.key());
    assert_eq!(second.document.key(), plan.key());
    assert_eq!(fake.opens_and_adds(), vec![]);
    assert_eq!(fake.document_count(), 1);
}

#[test]
fn file_name_match_in_other_directory_is_reused() {
    let fake = FakeVisio::new();
    let elsewhere = fake.with_saved(r"D:\Archive\Plan.vsdx");
    let config = ResolverConfig::default();

    let doc = Resolver::new(&fake, &config)
        .get_or_open(&PathBuf::from(r"C:\Docs\Plan.vsdx"))
        .unwrap();

    assert_eq!(doc.full_name, elsewhere.full_name);
    assert_eq!(fake.opens_and_adds(), vec![]);
    assert_eq!(fake.live_documents(), vec![doc.handle]);
}

#[test]
fn missing_file_is_reported_before_any_open() {
    let fake = FakeVisio::new();
    fake.with_saved(r"C:\Docs\Other.vsdx");
    let config = ResolverConfig::default();
    let missing = PathBuf::from("/no/such/dir/Plan.vsdx");

    let err = Resolver::new(&fake, &config)
        .resolve(&Selector::File(missing.clone()), &mut Unattended)
        .unwrap_err();

    assert!(matches!(err, Error::FileNotFound(ref p) if *p == missing));
    assert_eq!(fake.opens_and_adds(), vec![]);
}

#[test]
fn unopened_file_is_opened_once() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Plan.vsdx");
    std::fs::write(&file, b"PK").unwrap();

    let fake = FakeVisio::new();
    let config = ResolverConfig::default();
    let resolver = Resolver::new(&fake, &config);
    let selector = Selector::File(file.clone());

    let first = resolver.resolve(&selector, &mut Unattended).unwrap().unwrap();
    let second = resolver.resolve(&selector, &mut Unattended).unwrap().unwrap();

    assert_eq!(first.document.key(), second.document.key());
    assert_eq!(
        fake.opens_and_adds(),
        vec![Call::Open(file.display().to_string())]
    );
}

#[test]
fn rejected_open_falls_back_to_document_with_same_name() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Plan.vsdx");
    std::fs::write(&file, b"PK").unwrap();

    let fake = FakeVisio::new();
    fake.fail_opens("file is locked", true);
    let config = ResolverConfig::default();

    let doc = Resolver::new(&fake, &config).get_or_open(&file).unwrap();

    assert_eq!(doc.name, "Plan.vsdx");
    assert_eq!(fake.opens_and_adds().len(), 1);
    assert_eq!(fake.live_documents(), vec![doc.handle]);
}

#[test]
fn rejected_open_without_fallback_is_an_open_failure() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Plan.vsdx");
    std::fs::write(&file, b"PK").unwrap();

    let fake = FakeVisio::new();
    fake.fail_opens("file is corrupt", false);
    let config = ResolverConfig::default();

    let err = Resolver::new(&fake, &config).get_or_open(&file).unwrap_err();
    match err {
        Error::OpenFailure { path, reason } => {
            assert_eq!(path, file.display().to_string());
            assert!(reason.contains("file is corrupt"), "{reason}");
        }
        other => panic!("expected OpenFailure, got {other:?}"),
    }
}

#[test]
fn new_documents_are_created_blank_or_from_template() {
    let fake = FakeVisio::new();
    let config = ResolverConfig::default();
    let resolver = Resolver::new(&fake, &config);

    let blank = resolver
        .resolve(&Selector::New { template: None }, &mut Unattended)
        .unwrap()
        .unwrap();
    resolver
        .resolve(
            &Selector::New {
                template: Some(PathBuf::from("Basic Diagram.vstx")),
            },
            &mut Unattended,
        )
        .unwrap();

    assert_eq!(blank.document.name, "Drawing1");
    assert!(!blank.document.is_saved());
    assert_eq!(
        fake.opens_and_adds(),
        vec![Call::Add(None), Call::Add(Some("Basic Diagram.vstx".into()))]
    );
}

#[test]
fn resolved_bundle_carries_app_first_page_and_active_window() {
    let fake = FakeVisio::new();
    fake.with_saved(r"C:\Docs\Plan.vsdx");
    let config = ResolverConfig::default();

    let resolved = Resolver::new(&fake, &config)
        .resolve(&Selector::Index(0), &mut Unattended)
        .unwrap()
        .unwrap();

    assert_eq!(resolved.application, APP);
    assert_eq!(resolved.page, PageHandle(resolved.document.handle.raw() * 10));
    assert_eq!(resolved.window, WINDOW);
}

#[test]
fn interactive_pick_of_loaded_document() {
    let fake = FakeVisio::new();
    let docs = three_documents(&fake);
    let config = ResolverConfig::default();
    let mut prompt = ScriptedPrompt::choosing(Choice::Loaded(1));

    let resolved = Resolver::new(&fake, &config)
        .resolve(&Selector::Interactive, &mut prompt)
        .unwrap()
        .unwrap();

    assert_eq!(resolved.document.full_name, docs[1].full_name);
    assert_eq!(
        prompt.offered,
        docs.iter().map(|d| d.full_name.clone()).collect::<Vec<_>>()
    );
    assert!(prompt.warnings.is_empty());
    assert_eq!(fake.live_documents(), vec![resolved.document.handle]);
}

#[test]
fn repeated_enumerations_do_not_accumulate_handles() {
    let fake = FakeVisio::new();
    three_documents(&fake);
    let config = ResolverConfig::default();
    let resolver = Resolver::new(&fake, &config);

    for _ in 0..3 {
        let doc = resolver.document_at(2).unwrap();
        assert_eq!(fake.live_documents(), vec![doc.handle]);
        resolver.release_documents(&[doc]);
    }

    let binds = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Bind(_)))
        .count();
    assert_eq!(binds, 9);
    assert_eq!(fake.live_documents(), vec![]);
}

#[test]
fn interactive_cancel_is_not_an_error() {
    let fake = FakeVisio::new();
    three_documents(&fake);
    let config = ResolverConfig::default();
    let resolver = Resolver::new(&fake, &config);

    let mut cancelled = ScriptedPrompt::default();
    assert_eq!(
        resolver.resolve(&Selector::Interactive, &mut cancelled).unwrap(),
        None
    );

    let mut no_file = ScriptedPrompt::choosing(Choice::BrowseFile);
    assert_eq!(
        resolver.resolve(&Selector::Interactive, &mut no_file).unwrap(),
        None
    );
    assert_eq!(no_file.asked_for, vec![FileKind::Drawing]);
    assert_eq!(fake.opens_and_adds(), vec![]);
    assert_eq!(fake.live_documents(), vec![], "offered documents are released");
}

#[test]
fn interactive_failures_become_warnings() {
    let fake = FakeVisio::new();
    three_documents(&fake);
    let config = ResolverConfig::default();
    let resolver = Resolver::new(&fake, &config);

    let mut bad_index = ScriptedPrompt::choosing(Choice::Loaded(7));
    assert_eq!(
        resolver.resolve(&Selector::Interactive, &mut bad_index).unwrap(),
        None
    );
    assert_eq!(
        bad_index.warnings,
        vec!["Invalid document index 7 (3 documents open)".to_string()]
    );

    let mut missing =
        ScriptedPrompt::choosing(Choice::BrowseFile).with_file("/no/such/dir/Gone.vsdx");
    assert_eq!(
        resolver.resolve(&Selector::Interactive, &mut missing).unwrap(),
        None
    );
    assert_eq!(
        missing.warnings,
        vec!["File does not exist: /no/such/dir/Gone.vsdx".to_string()]
    );
}

#[test]
fn interactive_new_from_template_asks_for_a_template() {
    let fake = FakeVisio::new();
    let config = ResolverConfig::default();
    let mut prompt =
        ScriptedPrompt::choosing(Choice::NewFromTemplate).with_file("Basic Diagram.vstx");

    let resolved = Resolver::new(&fake, &config)
        .resolve(&Selector::Interactive, &mut prompt)
        .unwrap()
        .unwrap();

    assert_eq!(resolved.document.name, "Drawing1");
    assert_eq!(prompt.asked_for, vec![FileKind::Template]);
    assert_eq!(
        fake.opens_and_adds(),
        vec![Call::Add(Some("Basic Diagram.vstx".into()))]
    );
}
