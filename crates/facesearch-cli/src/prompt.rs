//! Interactive console prompts with retry on invalid input.

use facesearch_core::ReturnMode;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const INVALID_INPUT: &str = "\nInvalid input, please try again.\n";

const PRESET_PROMPT: &str = "\nPlease select a preset by typing 1 or 2, then press Enter.\n\
Standard mode returns only the best match and works well\n\
for most applications, Custom mode allows you finer control\n\
over the settings.\n\n1. Standard\n2. Custom\n";

const RETURN_MODE_PROMPT: &str = "\nReturn modes:\n\
1. Return all images that match the query image.\n\
2. Return only the closest match to the query image.\n\n\
Please select an option by typing 1 or 2, then press Enter.\n";

const THRESHOLD_PROMPT: &str = "\nSimilarity threshold:\n\
A higher value reduces the number of incorrect matches,\n\
but may result in fewer correct matches being detected.\n\
A lower value allows more matches to be detected,\n\
but can include a greater number of incorrect matches.\n\n\
Recommended values:\n\
99 when you want to avoid detecting the wrong people.\n\
80 when you want a high chance of finding someone.\n\n\
Please type a value between 0 and 100, then press Enter.\n";

const MAX_FACES_PROMPT: &str = "\nPlease enter the maximum number of faces in each database\n\
image that you would like to index, then press Enter.\n\n\
If you choose 1, then only the largest face from each database\n\
image will be available to match with a query image.\n\
If you would like everyone in a database image to stand the\n\
chance of being matched with a query image, including people\n\
far in the background, then choose a value which is higher\n\
than the expected maximum number of people in every image.\n";

pub const QUERY_PROMPT: &str = "Path to the query image directory:\n\n";
pub const DATABASE_PROMPT: &str = "\nPath to the database image directory:\n\n";

/// Preset chosen at the mode prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Standard,
    Custom,
}

/// Reads answers from `input` and writes prompts to `output`.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, message: &str) -> io::Result<()> {
        self.output.write_all(message.as_bytes())?;
        self.output.flush()
    }

    /// Ask for a directory until an existing path is entered.
    pub fn directory(&mut self, prompt: &str) -> io::Result<PathBuf> {
        loop {
            self.say(prompt)?;
            let answer = self.read_line()?;
            let path = PathBuf::from(answer.trim());
            if !answer.trim().is_empty() && path.exists() {
                return Ok(path);
            }
            self.say("\nThis is not a recognised path. Please try again\n")?;
        }
    }

    pub fn preset(&mut self) -> io::Result<Preset> {
        self.say(PRESET_PROMPT)?;
        self.choose(|answer| match answer {
            "1" => Some(Preset::Standard),
            "2" => Some(Preset::Custom),
            _ => None,
        })
    }

    pub fn return_mode(&mut self) -> io::Result<ReturnMode> {
        self.say(RETURN_MODE_PROMPT)?;
        self.choose(|answer| match answer {
            "1" => Some(ReturnMode::All),
            "2" => Some(ReturnMode::BestOnly),
            _ => None,
        })
    }

    /// Similarity threshold in `[0, 100]`.
    pub fn threshold(&mut self) -> io::Result<f32> {
        self.say(THRESHOLD_PROMPT)?;
        self.choose(|answer| {
            answer
                .parse::<f32>()
                .ok()
                .filter(|value| (0.0..=100.0).contains(value))
        })
    }

    pub fn max_faces(&mut self) -> io::Result<u32> {
        self.say(MAX_FACES_PROMPT)?;
        self.choose(|answer| answer.parse::<u32>().ok().filter(|value| *value >= 1))
    }

    /// Block until the user presses Enter. End of input counts as Enter.
    pub fn acknowledge(&mut self, message: &str) -> io::Result<()> {
        self.say(message)?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(())
    }

    fn choose<T>(&mut self, parse: impl Fn(&str) -> Option<T>) -> io::Result<T> {
        loop {
            let answer = self.read_line()?;
            if let Some(value) = parse(answer.trim()) {
                return Ok(value);
            }
            self.say(INVALID_INPUT)?;
        }
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before an answer was given",
            ));
        }
        Ok(line)
    }
}
