use pretty_assertions::assert_eq;
use retro_patch::{parse_patch, ApplyOptions, PatchError, PatchLog, PatchStatus, WorkingSet};

const BUFFER: &str = "\
one
two
three
four
five
six
seven
eight
nine
ten
eleven
twelve
";

// Hunk 1 is exact, hunk 2 needs fuzz 1 (`nine` became `NINE`), hunk 3
// removes a line that does not exist.
const DIFF: &str = "\
--- Numbers.txt
+++ Numbers.txt
@@ -1,3 +1,3 @@
 one
-two
+TWO
 three
@@ -7,3 +7,3 @@
 seven
-eight
+EIGHT
 nine
@@ -10,3 +10,3 @@
 ten
-zwoelf
+TWELVE
 twelve
";

fn working_set() -> WorkingSet {
    let mut ws = WorkingSet::new();
    ws.insert("Numbers.txt", BUFFER.replace("nine", "NINE"));
    ws
}

#[test]
fn failing_hunk_leaves_buffer_untouched() {
    let specs = parse_patch(DIFF, "numbers.patch").unwrap();
    let mut ws = working_set();
    let before = ws.clone();
    let options = ApplyOptions {
        max_fuzz: 1,
        ..ApplyOptions::default()
    };

    let err = ws.apply(&specs, &options).unwrap_err();
    assert!(matches!(err, PatchError::Rejected { .. }));
    let report = &err.reports()[0];
    assert_eq!(report.status, PatchStatus::Failure);
    let statuses: Vec<_> = report.hunks.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        [PatchStatus::Success, PatchStatus::Fuzzed, PatchStatus::Failure]
    );
    assert_eq!(report.hunks[1].fuzz, 1);
    assert_eq!(ws, before);
}

#[test]
fn fuzzed_file_commits() {
    let mut specs = parse_patch(DIFF, "numbers.patch").unwrap();
    specs[0].hunks.pop();
    let mut ws = working_set();
    let options = ApplyOptions {
        max_fuzz: 1,
        ..ApplyOptions::default()
    };

    let reports = ws.apply(&specs, &options).unwrap();
    assert_eq!(reports[0].status, PatchStatus::Fuzzed);
    let text = ws.get("Numbers.txt").unwrap();
    assert!(text.contains("TWO\n") && text.contains("EIGHT\nNINE\n"), "{text}");
}

#[test]
fn log_lists_failed_and_fuzzed_hunks() {
    let specs = parse_patch(DIFF, "numbers.patch").unwrap();
    let mut ws = working_set();
    let options = ApplyOptions {
        max_fuzz: 1,
        allow_failure: true,
        ..ApplyOptions::default()
    };
    let reports = ws.apply(&specs, &options).unwrap();

    let mut log = PatchLog::new();
    log.applying("numbers.patch", "bundle.zip");
    log.record(&reports);
    assert_eq!(log.failed(), 1);
    assert_eq!(
        log.as_str(),
        "Applying patch numbers.patch from bundle bundle.zip\n\
         Patch Numbers.txt failed: 1 of 3 hunks failed\n \
         - Hunk 2 fuzzed 1\n \
         - Hunk 3 failed (10+3 -> 10+3), fuzz 0..=1:\n \
         ten\n\
         -zwoelf\n\
         +TWELVE\n \
         twelve\n"
    );
}
