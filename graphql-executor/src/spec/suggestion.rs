//! "Did you mean" hints for misspelled names.

const MAX_SUGGESTIONS: usize = 5;

/// Options close enough to `input`, best match first.
pub(crate) fn suggestion_list<'a, I>(input: &str, options: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let input_lower = input.to_lowercase();
    let threshold = input.chars().count() * 2 / 5 + 1;

    let mut candidates: Vec<(usize, &str)> = options
        .into_iter()
        .filter_map(|option| {
            let distance = if option == input {
                0
            } else if option.to_lowercase() == input_lower {
                1
            } else {
                edit_distance(&input_lower, &option.to_lowercase())
            };
            (distance <= threshold).then_some((distance, option))
        })
        .collect();
    candidates.sort_by(|(a_distance, a), (b_distance, b)| {
        a_distance.cmp(b_distance).then_with(|| a.cmp(b))
    });
    candidates
        .into_iter()
        .map(|(_, option)| option.to_string())
        .collect()
}

/// Formats the trailing hint of an error message, or nothing without suggestions.
pub(crate) fn did_you_mean(suggestions: &[String]) -> String {
    let quoted: Vec<String> = suggestions
        .iter()
        .take(MAX_SUGGESTIONS)
        .map(|suggestion| format!("\"{suggestion}\""))
        .collect();
    match quoted.as_slice() {
        [] => String::new(),
        [only] => format!(" Did you mean {only}?"),
        [first, second] => format!(" Did you mean {first} or {second}?"),
        [init @ .., last] => format!(" Did you mean {}, or {last}?", init.join(", ")),
    }
}

/// Optimal string alignment distance: Levenshtein plus adjacent transpositions.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut before: Vec<usize> = vec![0; n + 1];
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
            if i > 1
                && j > 1
                && a_chars[i - 1] == b_chars[j - 2]
                && a_chars[i - 2] == b_chars[j - 1]
            {
                curr[j] = curr[j].min(before[j - 2] + 1);
            }
        }
        std::mem::swap(&mut before, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
