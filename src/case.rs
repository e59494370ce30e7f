//! Conversions between the three spellings of a flag name: `kebab-case` on the
//! command line, `snake_case` internally, `SCREAMING_SNAKE` in the environment.

fn words(input: &str) -> Vec<String> {
    // SCREAMING input has no camel-case boundaries: `S3BUCKET` is one word
    let chars: Vec<char> = if input.chars().any(char::is_lowercase) {
        input.chars().collect()
    } else {
        input.to_lowercase().chars().collect()
    };
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '-' | '_' | ' ' | '.') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // fooBar | HTTPServer
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

pub fn snake_case(input: &str) -> String {
    words(input).join("_")
}

pub fn kebab_case(input: &str) -> String {
    words(input).join("-")
}

pub fn screaming_snake_case(input: &str) -> String {
    snake_case(input).to_uppercase()
}
