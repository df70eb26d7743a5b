use super::Mood;
use regex::Regex;

/// Find a requested total duration such as "15 seconds" or "10sec" in the
/// prompt. The first match wins; zero is treated as no request.
pub fn extract_duration(prompt: &str) -> Option<u32> {
    let re = Regex::new(r"(\d+)\s*(seconds|second|sec)").ok()?;
    let captures = re.captures(&prompt.to_lowercase())?;

    captures[1].parse::<u32>().ok().filter(|seconds| *seconds > 0)
}

/// The sentence the relevance model compares every image against
pub fn describe(mood: Mood, prompt: &str) -> String {
    format!(
        "A photo that represents a {} feeling with the theme: {}",
        mood.label().to_lowercase(),
        prompt.trim().to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_duration() {
        assert_eq!(extract_duration("make a 15 second clip"), Some(15));
        assert_eq!(extract_duration("energetic sunset 10 seconds"), Some(10));
        assert_eq!(extract_duration("Beach trip, 30SEC please"), Some(30));
        assert_eq!(extract_duration("20 seconds or maybe 40 seconds"), Some(20));
        assert_eq!(extract_duration("a happy day"), None);
        assert_eq!(extract_duration("0 seconds"), None);
        assert_eq!(extract_duration("99999999999 seconds"), None);
    }

    #[test]
    fn test_describe_lowercases_mood_and_prompt() {
        assert_eq!(
            describe(Mood::Romantic, "Paris At Night"),
            "A photo that represents a romantic feeling with the theme: paris at night"
        );
    }
}
