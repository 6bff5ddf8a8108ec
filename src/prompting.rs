/// Marker that closes the prompt and opens the generated answer.
pub const ANSWER_MARKER: &str = "\n### Answer:";

/// Literal end-of-sequence text emitted by Llama-family tokenizers.
pub const EOS_MARKER: &str = "</s>";

/// Substrings after which a generated answer is considered finished, in scan order.
pub const END_MARKERS: [&str; 2] = [EOS_MARKER, "### Question:"];

const DEFAULT_SEED: u64 = 299_792_458;

/// Builds the fine-tuning prompt for a question.
///
/// The query is substituted verbatim. A query that itself contains `### Answer:` or `</s>`
/// is not escaped; extraction may then over-truncate the answer but never fails.
pub fn format_prompt(query: &str) -> String {
    format!("### Question:{} \n### Answer:", query)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    /// Random sampling toggle; off means argmax decoding.
    pub do_sample: bool,
    pub temperature: f64,
    pub top_p: f64,
    pub seed: u64,
    pub max_new_tokens: usize,
}

impl GenerationConfig {
    /// Decoding parameters every query is answered with.
    ///
    /// `temperature` has no effect while `do_sample` is false.
    pub fn answer_defaults() -> Self {
        Self {
            do_sample: false,
            temperature: 0.7,
            top_p: 0.9,
            seed: DEFAULT_SEED,
            max_new_tokens: 200,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::answer_defaults()
    }
}

pub fn contains_end_marker(text: &str) -> bool {
    END_MARKERS.iter().any(|marker| text.contains(marker))
}
