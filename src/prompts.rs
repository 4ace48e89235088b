//! Prompts sent to the vision model.
//!
//! The yes/no prompts all end with the same reply contract; the decoding side
//! lives in [`crate::backend::decode_yes_no`].

/// Maximum number of images attached to one summary request.
pub const MAX_SUMMARY_IMAGES: usize = 20;

/// Transcribe every piece of text on a slide.
pub const TRANSCRIBE_SLIDE_PROMPT: &str = "You have been given a slide from a slideshow (as shown in the image). \
To your best ability, answer this prompt with all of the text on the slide. Do not write anything else.";

/// Default cover-slide question: the ICLR-branded title slide that opens each
/// talk in a multi-talk workshop recording.
pub const DEFAULT_COVER_SLIDE_PROMPT: &str = "Does the text on this slide say 'ICLR International Conference on Learning Representations' or anything similar? \
Also, is the background of the slide a blue and black gradient with a bit of green? If the answer to both of these questions is yes, then say 'yes'. \
Otherwise, say 'no'. Do not answer with anything other than 'yes' or 'no'. Do not explain your answer. The texts 'yes' and 'no' are case sensitive.";

/// Per-slide summary used by [`crate::config::SummaryMode::PerSlide`].
pub const SLIDE_SUMMARY_PROMPT: &str = "You are given a slideshow image and OCR text. \
Produce a clear, concise, technically deep 2-3 paragraph summary.";

/// Ask whether a slide's graphic carries information its text does not.
pub fn unique_graphic_prompt(slide_text: &str) -> String {
    format!(
        "Does this slide (as shown in the picture) contain very useful information in a graphic that is NOT contained within the text on the slide? \
This means two things: 1. the graphic contains really useful information and 2. the information is not found in the text from the slide. \
If the answer to both of these questions is yes, then say 'yes'. Otherwise, say 'no'. \
Do not answer with anything other than 'yes' or 'no'. Here is the text from the slide:\n\n{slide_text}"
    )
}

/// Build the talk summary prompt around the concatenated slide text.
pub fn summary_prompt(text: &str, include_attribution: bool) -> String {
    let mut prompt = String::from(
        "You are about to be given a series of texts and images from a slideshow. \
Use what you can understand from the texts and images to create a clear, concise, technically deep 2-3 paragraph summary of the slideshow. \
If there is anything that you do not understand (such as random symbols, misplaced words, or jumbled letters), ignore it. \
Avoid repetition. Images will likely be given along with this prompt. \
Do not begin your response with anything like 'Here's a concise 2-3 paragraph summary of the key points from the slideshow:'. \
Instead, just start the summary immediately. IMPORTANT: Please remember to give a 2-3 PARAGRAPH summary. \
Do not summarize the slides in a set of bullet points or in a list.",
    );
    if include_attribution {
        prompt.push_str(
            " Also, include the author of the slideshow's name in your summary, and the title of the slideshow.",
        );
    }
    prompt.push_str(" Here is your text: \n\n");
    prompt.push_str(text);
    prompt
}

/// Per-slide summary prompt with the slide's own text appended.
pub fn slide_summary_prompt(slide_text: &str) -> String {
    if slide_text.trim().is_empty() {
        SLIDE_SUMMARY_PROMPT.to_string()
    } else {
        format!("{SLIDE_SUMMARY_PROMPT} Here is the OCR text:\n\n{slide_text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_is_optional() {
        let plain = summary_prompt("body", false);
        let attributed = summary_prompt("body", true);
        assert!(!plain.contains("author"));
        assert!(attributed.contains("author of the slideshow"));
        assert!(attributed.ends_with("body"));
    }

    #[test]
    fn summary_prompt_forbids_lists_and_preamble() {
        let p = summary_prompt("x", false);
        assert!(p.contains("2-3 PARAGRAPH"));
        assert!(p.contains("bullet points"));
        assert!(p.contains("start the summary immediately"));
    }

    #[test]
    fn yes_no_prompts_state_the_contract() {
        assert!(DEFAULT_COVER_SLIDE_PROMPT.contains("'yes' or 'no'"));
        let g = unique_graphic_prompt("Results table");
        assert!(g.contains("'yes' or 'no'"));
        assert!(g.ends_with("Results table"));
    }
}
