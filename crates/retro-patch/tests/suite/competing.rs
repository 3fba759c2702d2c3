use pretty_assertions::assert_eq;
use retro_patch::{parse_patch, ApplyOptions, PatchStatus, WorkingSet};

const FOO: &str = "\
package net;

class Foo {
    int a;

    void run() {
        a++;
    }
}
";

// Hunk 2 expects a body that isn't there.
const SPEC_A: &str = "\
--- a/net/Foo.java
+++ b/net/Foo.java
@@ -3,2 +3,2 @@
 class Foo {
-    int a;
+    int b;
@@ -6,3 +6,3 @@
     void run() {
-        a--;
+        b--;
     }
";

const SPEC_B: &str = "\
--- a/net/Foo.java
+++ b/net/Foo.java
@@ -3,2 +3,2 @@
 class Foo {
-    int a;
+    int b;
@@ -6,3 +6,3 @@
     void run() {
-        a++;
+        b++;
     }
";

fn options() -> ApplyOptions {
    ApplyOptions {
        max_fuzz: 2,
        strip_components: 1,
        ..ApplyOptions::default()
    }
}

fn working_set() -> WorkingSet {
    let mut ws = WorkingSet::new();
    ws.insert("net/Foo.java", FOO);
    ws
}

#[test]
fn first_successful_candidate_wins() {
    let mut specs = parse_patch(SPEC_A, "Foo.java.patch").unwrap();
    specs.extend(parse_patch(SPEC_B, "Foo.java.patch2").unwrap());

    let mut ws = working_set();
    let reports = ws.apply(&specs, &options()).unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, PatchStatus::Success);
    assert_eq!(
        ws.get("net/Foo.java").unwrap(),
        FOO.replace("int a;", "int b;").replace("a++;", "b++;")
    );
}

#[test]
fn last_attempt_is_reported_when_nothing_applies() {
    let mut specs = parse_patch(SPEC_B, "Foo.java.patch").unwrap();
    specs.extend(parse_patch(SPEC_A, "Foo.java.patch2").unwrap());
    specs[0].hunks[1].lines[1] = retro_patch::HunkLine::Remove("        a /= 2;".to_owned());

    let mut ws = working_set();
    let err = ws.apply(&specs, &options()).unwrap_err();
    let reports = err.reports();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, PatchStatus::Failure);
    // Hunk 2 of the second candidate removes `a--;`.
    assert_eq!(reports[0].hunks[1].hunk.lines[1].text(), "        a--;");
    assert_eq!(ws.get("net/Foo.java"), Some(FOO));
}
