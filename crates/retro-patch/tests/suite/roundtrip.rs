use pretty_assertions::assert_eq;
use retro_patch::{parse_patch, ApplyOptions, PatchStatus, WorkingSet};

const ORIGINAL: &str = "\
package net.minecraft.block;

public class Block {
    private final int id;

    public Block(int id) {
        this.id = id;
    }

    public int getId() {
        return id;
    }
}
";

const MODIFIED: &str = "\
package net.minecraft.block;

public class Block {
    private final int id;
    private boolean opaque = true;

    public Block(int id) {
        this.id = id;
    }

    public boolean isOpaque() {
        return opaque;
    }
}
";

fn unified(old: &str, new: &str) -> String {
    similar::TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header("a/net/minecraft/block/Block.java", "b/net/minecraft/block/Block.java")
        .to_string()
}

#[test]
fn inverse_then_forward_restores_buffer() {
    let spec = parse_patch(&unified(ORIGINAL, MODIFIED), "Block.java.patch")
        .unwrap()
        .remove(0);
    let options = ApplyOptions {
        strip_components: 1,
        ..ApplyOptions::default()
    };

    let mut ws = WorkingSet::new();
    ws.insert("net/minecraft/block/Block.java", MODIFIED);

    let reports = ws.apply(&[spec.reversed()], &options).unwrap();
    assert_eq!(reports[0].status, PatchStatus::Success);
    assert_eq!(ws.get("net/minecraft/block/Block.java"), Some(ORIGINAL));

    let reports = ws.apply(&[spec], &options).unwrap();
    assert_eq!(reports[0].status, PatchStatus::Success);
    assert_eq!(ws.get("net/minecraft/block/Block.java"), Some(MODIFIED));
}

#[test]
fn applies_generated_diff_against_shifted_source() {
    let spec = parse_patch(&unified(ORIGINAL, MODIFIED), "Block.java.patch")
        .unwrap()
        .remove(0);
    let shifted = ORIGINAL.replacen(
        "package net.minecraft.block;\n",
        "package net.minecraft.block;\n\nimport java.util.List;\n",
        1,
    );
    let mut ws = WorkingSet::new();
    ws.insert("net/minecraft/block/Block.java", shifted.as_str());

    let options = ApplyOptions {
        strip_components: 1,
        ..ApplyOptions::default()
    };
    let reports = ws.apply(&[spec], &options).unwrap();
    assert_eq!(reports[0].status, PatchStatus::Success);
    assert!(reports[0].hunks.iter().all(|h| h.offset == 2));
    assert_eq!(
        ws.get("net/minecraft/block/Block.java").unwrap(),
        MODIFIED.replacen(
            "package net.minecraft.block;\n",
            "package net.minecraft.block;\n\nimport java.util.List;\n",
            1,
        )
    );
}
