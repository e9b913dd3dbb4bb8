//! Step-list detection.
//!
//! Procedural content (numbered or bulleted sequences) is pulled out of
//! the prose so the training workflow can render structured step lists
//! without re-parsing chunks.

/// Whether a line opens a step, returning the step text without its marker.
fn step_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();

    // Numbered: "1. ", "2) ", "10. "
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && digits <= 3 {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }

    // Bulleted: "- ", "* ", "• "
    for marker in ["- ", "* ", "\u{2022} "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }

    None
}

/// Find every run of two or more consecutive step lines.
#[must_use]
pub fn extract_step_lists(text: &str) -> Vec<Vec<String>> {
    let mut lists = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in text.lines() {
        if let Some(step) = step_text(line) {
            current.push(step.to_string());
        } else if !line.trim().is_empty() {
            // Prose interrupts the run; a single stray marker is not a
            // procedure.
            if current.len() >= 2 {
                lists.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= 2 {
        lists.push(current);
    }

    lists
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_steps() {
        let text = "How to deploy:\n1. Build the image.\n2. Push it.\n3. Roll out.\nDone.";
        let lists = extract_step_lists(text);
        assert_eq!(lists.len(), 1);
        assert_eq!(
            lists[0],
            vec!["Build the image.", "Push it.", "Roll out."]
        );
    }

    #[test]
    fn test_bulleted_steps() {
        let text = "- check the cable\n- reboot the router";
        let lists = extract_step_lists(text);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].len(), 2);
    }

    #[test]
    fn test_single_marker_is_not_a_procedure() {
        let text = "Intro\n1. only one item\nmore prose";
        assert!(extract_step_lists(text).is_empty());
    }

    #[test]
    fn test_two_separate_lists() {
        let text = "1. a\n2. b\n\nsome prose\n\n- x\n- y\n- z";
        let lists = extract_step_lists(text);
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[1].len(), 3);
    }
}
