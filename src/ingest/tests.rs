//! Unit tests for URL classification.

use rstest::{fixture, rstest};

use super::{ClassifiedUrl, Classifier, download_command, extract_urls, file_name};
use crate::catalog::{DEFAULT_MODEL_FOLDERS, RemoteLayout};
use crate::test_support::ScriptedConsole;

#[fixture]
fn classifier() -> Classifier {
    Classifier::new(DEFAULT_MODEL_FOLDERS)
}

#[rstest]
#[case("https://host/models/clip_vision/model.bin", "clip_vision")]
#[case("https://host/models/clip/model.bin", "clip")]
#[case(
    "https://huggingface.co/org/repo/resolve/main/split_files/text_encoders/umt5.safetensors",
    "text_encoders"
)]
#[case("https://host/LoRAs/style.safetensors", "loras")]
#[case("https://host/files/clip_vision_h.safetensors", "clip_vision")]
#[case("https://host/files/my-vae-ft.safetensors?download=1", "vae")]
fn classifies_by_segment_then_substring(
    classifier: Classifier,
    #[case] url: &str,
    #[case] expected: &str,
) {
    assert_eq!(classifier.category_for(url), Some(expected));
}

#[rstest]
fn whole_segment_beats_longer_substring(classifier: Classifier) {
    let url = "https://host/unet/clip_vision_variant.safetensors";

    assert_eq!(classifier.category_for(url), Some("unet"));
}

#[rstest]
fn unmatched_urls_go_to_manual(classifier: Classifier) {
    let result = classifier.classify([
        "https://civitai.com/api/download/models/12345",
        "https://host/loras/a.safetensors",
    ]);

    assert_eq!(
        result.auto,
        [ClassifiedUrl {
            url: String::from("https://host/loras/a.safetensors"),
            category: String::from("loras"),
        }]
    );
    assert_eq!(
        result.manual,
        [String::from("https://civitai.com/api/download/models/12345")]
    );
}

#[rstest]
fn manual_review_skips_and_clamps(classifier: Classifier) {
    let console = ScriptedConsole::new(["8", "abc", "99", "0"]);
    let manual: Vec<String> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| format!("https://host/download/{name}.bin"))
        .collect();

    let placed = classifier.review_manual(&console, &manual);

    let summary: Vec<(&str, &str)> = placed
        .iter()
        .map(|item| (item.url.as_str(), item.category.as_str()))
        .collect();
    assert_eq!(
        summary,
        [
            ("https://host/download/a.bin", "clip_vision"),
            ("https://host/download/c.bin", "upscale_models"),
        ]
    );
    assert!(console.mentions("[0] Skip"));
    assert!(console.mentions("Unrecognised: a.bin"));
}

#[rstest]
fn manual_review_skips_at_end_of_input(classifier: Classifier) {
    let console = ScriptedConsole::new(Vec::<String>::new());

    let placed = classifier.review_manual(&console, &[String::from("https://host/x")]);

    assert!(placed.is_empty());
}

#[rstest]
fn extracts_urls_from_free_text() {
    let urls = extract_urls("https://a/x.bin, https://b/y.bin\n  not-a-url ftp://c http://d/z");

    assert_eq!(urls, ["https://a/x.bin", "https://b/y.bin", "http://d/z"]);
}

#[rstest]
#[case("https://host/path/model.safetensors?download=true", Some("model.safetensors"))]
#[case("https://host/path/", None)]
#[case("https://host/file.bin#frag", Some("file.bin"))]
fn file_name_strips_query(#[case] url: &str, #[case] expected: Option<&str>) {
    assert_eq!(file_name(url), expected);
}

#[rstest]
fn download_command_quotes_hostile_urls() {
    let command = download_command(
        &RemoteLayout::default(),
        "loras",
        "https://host/x.bin?a=1&b='; rm -rf /",
    );

    assert_eq!(
        command.as_str(),
        "mkdir -p /workspace/ComfyUI/models/loras && cd /workspace/ComfyUI/models/loras && \
         wget -c --show-progress --progress=bar:force:noscroll --content-disposition \
         'https://host/x.bin?a=1&b='\\''; rm -rf /'"
    );
}
