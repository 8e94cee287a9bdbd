//! Roundtrip tests for diff and apply using datatest-stable.
//!
//! Each test case is a file in `tests/roundtrip-cases/` with format:
//! ```text
//! <old markup>
//! ===
//! <new markup>
//! ```
//!
//! The test verifies: apply(old, diff(old, new)) == new

use reheat::{LiveDocument, diff, parse_str};
use std::path::Path;

fn run_roundtrip_test(path: &Path) -> datatest_stable::Result<()> {
    facet_testhelpers::setup();

    let content = std::fs::read_to_string(path)?;
    let parts: Vec<&str> = content.split("\n===\n").collect();

    if parts.len() != 2 {
        return Err(format!(
            "Test file must have exactly one '===' separator, found {} parts",
            parts.len()
        )
        .into());
    }

    let old = parts[0].trim();
    let new = parts[1].trim();

    let old_tree = parse_str(old).map_err(|e| format!("old markup failed to parse: {e}"))?;
    let new_tree = parse_str(new).map_err(|e| format!("new markup failed to parse: {e}"))?;

    // well-formed input serializes back to itself
    if old_tree.html() != old {
        return Err(format!("old markup did not survive parsing:\n{}", old_tree.html()).into());
    }

    let patches = diff(&old_tree, &new_tree).map_err(|e| format!("diff failed: {e}"))?;

    let mut doc = LiveDocument::from_tree(&old_tree);
    patches
        .apply(&mut doc)
        .map_err(|e| format!("apply failed: {e}\npatches: {patches:#?}"))?;
    let result = doc.to_html();

    let expected = LiveDocument::from_tree(&new_tree).to_html();

    if result != expected {
        return Err(format!(
            "Roundtrip failed!\nOld: {old}\nNew: {new}\nResult: {result}\nExpected: {expected}\nPatches: {patches:#?}"
        )
        .into());
    }

    // replaying the same diff through the wire format gives the same document
    let decoded = reheat::PatchSet::from_postcard(&patches.to_postcard())
        .map_err(|e| format!("postcard decode failed: {e:?}"))?;
    let mut replayed = LiveDocument::from_tree(&old_tree);
    decoded
        .apply(&mut replayed)
        .map_err(|e| format!("replay failed: {e}"))?;
    if replayed.to_html() != expected {
        return Err(format!("Replay diverged: {}", replayed.to_html()).into());
    }

    Ok(())
}

datatest_stable::harness! {
    { test = run_roundtrip_test, root = "tests/roundtrip-cases", pattern = r".*\.html$" },
}
