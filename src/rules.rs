use regex::{Captures, Regex, RegexBuilder};
use scraper::Selector;
use std::cmp::Reverse;

use crate::error::RuleError;
use crate::record::{ClubType, CourtSurface, Field, MembershipStatus};

// ============================================================================
// Rule tables
// ============================================================================

type Producer<T> = Box<dyn Fn(&Captures<'_>) -> Option<T> + Send + Sync>;

/// One pattern in a field's table.
///
/// The producer turns a match into a value; returning `None` rejects the
/// match and scanning moves on to the next one.
pub struct Rule<T> {
    pattern: Regex,
    produce: Producer<T>,
    specificity: u8,
}

impl<T: Clone + Send + Sync + 'static> Rule<T> {
    /// Any match of `pattern` (case-insensitive) yields `value`.
    pub fn fixed(pattern: &str, value: T, specificity: u8) -> Result<Self, RuleError> {
        Ok(Self {
            pattern: RegexBuilder::new(pattern).case_insensitive(true).build()?,
            produce: Box::new(move |_| Some(value.clone())),
            specificity,
        })
    }
}

impl<T> Rule<T> {
    /// Case-insensitive pattern with a producer reading the captures.
    pub fn capture<F>(pattern: &str, specificity: u8, produce: F) -> Result<Self, RuleError>
    where
        F: Fn(&Captures<'_>) -> Option<T> + Send + Sync + 'static,
    {
        Ok(Self {
            pattern: RegexBuilder::new(pattern).case_insensitive(true).build()?,
            produce: Box::new(produce),
            specificity,
        })
    }

    /// Like [`Rule::capture`] but the pattern is matched case-sensitively.
    pub fn capture_exact<F>(pattern: &str, specificity: u8, produce: F) -> Result<Self, RuleError>
    where
        F: Fn(&Captures<'_>) -> Option<T> + Send + Sync + 'static,
    {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            produce: Box::new(produce),
            specificity,
        })
    }

    fn first_match(&self, text: &str) -> Option<Match<T>> {
        self.pattern.captures_iter(text).find_map(|caps| {
            let whole = caps.get(0)?;
            let value = (self.produce)(&caps)?;
            Some(Match {
                value,
                start: whole.start(),
                len: whole.len(),
                specificity: self.specificity,
            })
        })
    }
}

/// How competing matches from different rules are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Earliest match in the text wins.
    FirstInDocument,
    /// Highest specificity wins, earliest breaks ties.
    MostSpecific,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<T> {
    pub value: T,
    pub start: usize,
    pub len: usize,
    pub specificity: u8,
}

pub struct RuleTable<T> {
    rules: Vec<Rule<T>>,
    resolution: Resolution,
}

impl<T> RuleTable<T> {
    pub fn new(resolution: Resolution, rules: Vec<Rule<T>>) -> Self {
        Self { rules, resolution }
    }

    pub fn best_match(&self, text: &str) -> Option<Match<T>> {
        let mut best: Option<Match<T>> = None;
        for candidate in self.rules.iter().filter_map(|rule| rule.first_match(text)) {
            let replace = match &best {
                None => true,
                Some(current) => self.rank(&candidate) < self.rank(current),
            };
            if replace {
                best = Some(candidate);
            }
        }
        best
    }

    pub fn resolve(&self, text: &str) -> Field<T> {
        self.best_match(text).map(|m| m.value).into()
    }

    fn rank(&self, m: &Match<T>) -> (usize, usize, Reverse<usize>) {
        let specificity = usize::from(u8::MAX - m.specificity);
        match self.resolution {
            Resolution::FirstInDocument => (m.start, specificity, Reverse(m.len)),
            Resolution::MostSpecific => (specificity, m.start, Reverse(m.len)),
        }
    }
}

// ============================================================================
// Standard tables
// ============================================================================

const NUMBER_WORDS: [&str; 20] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen",
    "twenty",
];

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const PROVINCES: [&str; 20] = [
    "ON", "Ont", "Ont.", "Ontario", "QC", "Quebec", "BC", "AB", "Alberta", "MB", "Manitoba", "SK",
    "Saskatchewan", "NS", "NB", "PE", "PEI", "NL", "Canada", "CA",
];

const STREET_SUFFIXES: [&str; 24] = [
    "Avenue", "Ave", "Ave.", "Street", "St", "St.", "Road", "Rd", "Rd.", "Drive", "Dr", "Dr.",
    "Boulevard", "Blvd", "Blvd.", "Lane", "Court", "Way", "Crescent", "Cres", "Place", "Parkway",
    "Trail", "Circle",
];

const DIRECTIONS: [&str; 8] = ["East", "West", "North", "South", "E", "W", "N", "S"];

/// Words that belong to a club or venue name rather than a city.
const VENUE_WORDS: [&str; 10] = [
    "Club", "Tennis", "Racquet", "Racquets", "Lawn", "Association", "Courts", "Centre", "Center",
    "Park",
];

const TENS_WORDS: &str = "twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety";

/// Words allowed between a count and "courts".
const COURT_QUALIFIERS: &str =
    r"(?:(?:tennis|indoor|outdoor|lit|floodlit|hard|clay|har-tru|grass|all-weather|public|private|new)\s+){0,3}";

const MONTH_PATTERN: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

const CITY_WORDS: &str = r"[A-Z][A-Za-z'.\-]*(?:[ \t]+[A-Z][A-Za-z'.\-]*)*";

/// Immutable extraction configuration, built once and shared.
pub struct ExtractionRules {
    pub links: Selector,
    pub scripts: Selector,
    pub contact_regions: Selector,
    pub email_shape: Regex,
    pub ignored_email_fragments: Vec<&'static str>,
    pub email: RuleTable<String>,
    pub location: RuleTable<String>,
    pub club_type: RuleTable<ClubType>,
    pub membership: RuleTable<MembershipStatus>,
    pub waitlist_length: RuleTable<u32>,
    pub court_count: RuleTable<u32>,
    pub court_surface: RuleTable<CourtSurface>,
    pub season: RuleTable<String>,
}

impl ExtractionRules {
    pub fn standard() -> Result<Self, RuleError> {
        let ignored: Vec<&'static str> =
            vec!["example.com", "domain.com", "email.com", "test.com", "noreply", "no-reply"];

        Ok(Self {
            links: selector("a[href]")?,
            scripts: selector("script")?,
            contact_regions: selector(
                "address, footer, [class*=contact], [id*=contact], [class*=address], \
                 [class*=location], [id*=location]",
            )?,
            email_shape: Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")?,
            email: email_table(ignored.clone())?,
            ignored_email_fragments: ignored,
            location: location_table()?,
            club_type: club_type_table()?,
            membership: membership_table()?,
            waitlist_length: waitlist_table()?,
            court_count: court_count_table()?,
            court_surface: surface_table()?,
            season: season_table()?,
        })
    }

    pub fn is_ignored_email(&self, email: &str) -> bool {
        is_ignored(&self.ignored_email_fragments, email)
    }
}

fn selector(css: &str) -> Result<Selector, RuleError> {
    Selector::parse(css).map_err(|e| RuleError::Selector {
        selector: css.to_string(),
        reason: format!("{e:?}"),
    })
}

fn is_ignored(fragments: &[&str], email: &str) -> bool {
    let lower = email.to_lowercase();
    fragments.iter().any(|f| lower.contains(f))
}

fn accept_email(fragments: &[&str], caps: &Captures<'_>) -> Option<String> {
    let email = caps.get(0)?.as_str();
    (!is_ignored(fragments, email)).then(|| email.to_string())
}

fn email_table(ignored: Vec<&'static str>) -> Result<RuleTable<String>, RuleError> {
    let ignored_generic = ignored.clone();

    Ok(RuleTable::new(
        Resolution::MostSpecific,
        vec![
            Rule::capture(
                r"\b(?:info|admin|tennis|membership|contact|club)@[a-z0-9.\-]+\.[a-z]{2,}\b",
                2,
                move |caps| accept_email(&ignored, caps),
            )?,
            Rule::capture(r"\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b", 1, move |caps| {
                accept_email(&ignored_generic, caps)
            })?,
        ],
    ))
}

fn location_table() -> Result<RuleTable<String>, RuleError> {
    let postal = format!(
        r"(?P<city>{CITY_WORDS})[ \t]*,?[ \t]*(?:(?:ON|Ont\.?|Ontario)[ \t]*,?[ \t]*)?\b[A-Z]\d[A-Z][ \t]?\d[A-Z]\d\b"
    );
    let located_in = format!(r"(?i:located[ \t]+in)[ \t]+(?P<city>{CITY_WORDS})");

    Ok(RuleTable::new(
        Resolution::MostSpecific,
        vec![
            Rule::capture_exact(&postal, 2, |caps| clean_city(&caps["city"]))?,
            Rule::capture_exact(&located_in, 1, |caps| clean_city(&caps["city"]))?,
        ],
    ))
}

/// Trims venue names, street-address prefixes and trailing province tokens
/// from a captured run of capitalized words.
pub fn clean_city(raw: &str) -> Option<String> {
    let mut words: Vec<&str> = raw.split_whitespace().collect();

    while words.last().is_some_and(|w| PROVINCES.contains(&w.trim_end_matches(','))) {
        words.pop();
    }

    if let Some(idx) = words.iter().rposition(|w| VENUE_WORDS.contains(w)) {
        words.drain(..=idx);
    }

    if let Some(idx) = words.iter().rposition(|w| STREET_SUFFIXES.contains(w)) {
        words.drain(..=idx);
        if words.len() > 1 && DIRECTIONS.contains(&words[0]) {
            words.remove(0);
        }
    }

    let city = words.join(" ");
    let city = city.trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace());
    (!city.is_empty()).then(|| city.to_string())
}

fn club_type_table() -> Result<RuleTable<ClubType>, RuleError> {
    Ok(RuleTable::new(
        Resolution::FirstInDocument,
        vec![
            Rule::fixed(r"\bsemi-?private\b", ClubType::SemiPrivate, 2)?,
            Rule::fixed(
                r"\bprivate\s+(?:tennis\s+)?club\b|\bmembers[\s-]only\b|\bmembership\s+required\b",
                ClubType::Private,
                1,
            )?,
            Rule::fixed(
                r"\bcommunity\s+(?:centre|center|club|tennis)\b",
                ClubType::Community,
                1,
            )?,
            Rule::fixed(
                r"\bpublic\s+(?:tennis\s+)?courts?\b|\bpublic\s+tennis\b|\bmunicipal\b",
                ClubType::Public,
                1,
            )?,
        ],
    ))
}

fn membership_table() -> Result<RuleTable<MembershipStatus>, RuleError> {
    Ok(RuleTable::new(
        Resolution::MostSpecific,
        vec![
            Rule::fixed(
                r"\baccepting\s+(?:new\s+)?(?:members|memberships|applications)\b|\bopen\s+membership\b|\bmemberships?\s+(?:is\s+|are\s+)?(?:now\s+)?(?:available|open)\b",
                MembershipStatus::Open,
                1,
            )?,
            Rule::fixed(
                r"\bwait[\s-]?list(?:ed)?\b|\bwaiting\s+list\b",
                MembershipStatus::Waitlist,
                2,
            )?,
            Rule::fixed(
                r"\bno\s+availability\b|\bnot\s+(?:currently\s+)?accepting\b|\bmemberships?\s+(?:is\s+|are\s+)?(?:closed|full)\b|\bfull\s+capacity\b",
                MembershipStatus::Full,
                4,
            )?,
            Rule::fixed(r"\bno\s+wait(?:ing)?[\s-]?list\b", MembershipStatus::Open, 3)?,
        ],
    ))
}

fn waitlist_table() -> Result<RuleTable<u32>, RuleError> {
    Ok(RuleTable::new(
        Resolution::FirstInDocument,
        vec![
            Rule::capture(
                r"\bwait(?:ing)?[\s-]?list\s*(?::|of|is|at)?\s*(?:approximately|about|over|around)?\s*(\d{1,3})\b([-.]\d)?",
                1,
                // A trailing `-555` or `.555` means a phone number, not a length.
                |caps| match caps.get(2) {
                    Some(_) => None,
                    None => caps[1].parse().ok(),
                },
            )?,
            Rule::capture(
                r"\b(\d{1,3})\+?\s*(?:people|members|players|families|applicants|names)?\s+(?:currently\s+)?on\s+(?:the\s+|our\s+)?wait(?:ing)?[\s-]?list\b",
                1,
                |caps| caps[1].parse().ok(),
            )?,
            Rule::fixed(r"\bno\s+wait(?:ing)?[\s-]?list\b", 0, 2)?,
        ],
    ))
}

fn court_count_table() -> Result<RuleTable<u32>, RuleError> {
    let in_range = |n: u32| (1..=50).contains(&n).then_some(n);
    let words = NUMBER_WORDS.join("|");

    Ok(RuleTable::new(
        Resolution::FirstInDocument,
        vec![
            Rule::capture(
                &format!(r"\b(\d{{1,3}})(?:\s*-\s*|\s+){COURT_QUALIFIERS}courts?\b"),
                2,
                move |caps| caps[1].parse().ok().and_then(in_range),
            )?,
            Rule::capture(r"\bcourts?\s*:\s*(\d{1,3})\b", 2, move |caps| {
                caps[1].parse().ok().and_then(in_range)
            })?,
            Rule::capture(
                &format!(r"\b(?:({TENS_WORDS})[\s-])?({words})(?:\s*-\s*|\s+){COURT_QUALIFIERS}courts?\b"),
                1,
                // "twenty-one courts" is out of range, not "one court".
                |caps| match caps.get(1) {
                    Some(_) => None,
                    None => word_to_number(&caps[2]),
                },
            )?,
        ],
    ))
}

/// Maps "one" through "twenty" to a number.
pub fn word_to_number(word: &str) -> Option<u32> {
    let lower = word.to_lowercase();
    NUMBER_WORDS
        .iter()
        .position(|w| *w == lower)
        .map(|i| i as u32 + 1)
}

fn surface_table() -> Result<RuleTable<CourtSurface>, RuleError> {
    Ok(RuleTable::new(
        Resolution::FirstInDocument,
        vec![
            Rule::fixed(
                r"\bhard[\s-]?(?:courts?|surfaces?)\b|\bacrylic\b",
                CourtSurface::Hard,
                1,
            )?,
            Rule::fixed(r"\bclay\b|\bhar-?tru\b", CourtSurface::Clay, 1)?,
            Rule::fixed(r"\bgrass\b", CourtSurface::Grass, 1)?,
            Rule::fixed(r"\bindoor\b", CourtSurface::Indoor, 1)?,
            Rule::fixed(
                r"\bmixed[\s-]surfaces?\b|\bmulti-?surfaces?\b",
                CourtSurface::Mixed,
                2,
            )?,
        ],
    ))
}

fn season_table() -> Result<RuleTable<String>, RuleError> {
    Ok(RuleTable::new(
        Resolution::FirstInDocument,
        vec![
            Rule::fixed(
                r"\byear[\s-]round\b|\ball[\s-]year\b|\b12[\s-]months\b|\bindoor\s+facility\b",
                "Year-round".to_string(),
                2,
            )?,
            Rule::capture(
                &format!(r"\b{MONTH_PATTERN}\.?\s*(?:-|–|\bto\b|\bthrough\b|\bthru\b|\buntil\b)\s*{MONTH_PATTERN}\b"),
                2,
                |caps| Some(format!("{}-{}", month_name(&caps[1])?, month_name(&caps[2])?)),
            )?,
            Rule::fixed(
                r"\bseasonal\b|\boutdoor\s+only\b|\bsummer\s+season\b",
                "Seasonal".to_string(),
                1,
            )?,
        ],
    ))
}

/// Full month name for a (possibly abbreviated) month token.
pub fn month_name(token: &str) -> Option<&'static str> {
    let lower = token.to_lowercase();
    let prefix = lower.get(..3)?;
    MONTHS
        .iter()
        .find(|m| m.to_lowercase().starts_with(prefix))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ExtractionRules {
        ExtractionRules::standard().unwrap()
    }

    #[test]
    fn standard_rules_compile() {
        assert!(ExtractionRules::standard().is_ok());
    }

    #[test]
    fn first_in_document_prefers_earliest_match() {
        let table = RuleTable::new(
            Resolution::FirstInDocument,
            vec![
                Rule::fixed("beta", 'b', 9).unwrap(),
                Rule::fixed("alpha", 'a', 1).unwrap(),
            ],
        );
        assert_eq!(table.resolve("alpha then beta"), Field::Found('a'));
    }

    #[test]
    fn most_specific_beats_earlier_general_match() {
        let table = RuleTable::new(
            Resolution::MostSpecific,
            vec![
                Rule::fixed("general", 'g', 1).unwrap(),
                Rule::fixed("specific", 's', 2).unwrap(),
            ],
        );
        assert_eq!(table.resolve("general first, specific later"), Field::Found('s'));
        assert_eq!(table.resolve("only general"), Field::Found('g'));
        assert_eq!(table.resolve("nothing"), Field::NotFound);
    }

    #[test]
    fn rejected_match_keeps_scanning() {
        let rules = rules();
        assert_eq!(
            rules.court_count.resolve("one of over 100 courts in the city, we have 6 courts"),
            Field::Found(6)
        );
        assert_eq!(rules.court_count.resolve("400 courts nationwide"), Field::NotFound);
    }

    #[test]
    fn word_numbers_stop_at_twenty() {
        assert_eq!(word_to_number("Twelve"), Some(12));
        assert_eq!(word_to_number("twenty"), Some(20));
        assert_eq!(word_to_number("thirty"), None);
    }

    #[test]
    fn clean_city_strips_street_and_province() {
        assert_eq!(clean_city("Toronto"), Some("Toronto".into()));
        assert_eq!(clean_city("Toronto ON"), Some("Toronto".into()));
        assert_eq!(clean_city("Eglinton Avenue West Toronto"), Some("Toronto".into()));
        assert_eq!(clean_city("Richmond Hill Ontario"), Some("Richmond Hill".into()));
        assert_eq!(clean_city("Ontario"), None);
        assert_eq!(clean_city("Balmy Beach Club Toronto"), Some("Toronto".into()));
        assert_eq!(clean_city("Leaside Tennis Club"), None);
    }

    #[test]
    fn compound_number_words_are_not_split() {
        let rules = rules();
        assert_eq!(rules.court_count.resolve("We have twenty-one courts."), Field::NotFound);
        assert_eq!(rules.court_count.resolve("Twenty one lit courts"), Field::NotFound);
        assert_eq!(rules.court_count.resolve("twenty courts in all"), Field::Found(20));
        assert_eq!(
            rules.court_count.resolve("twenty-one members play on five courts"),
            Field::Found(5)
        );
    }

    #[test]
    fn phone_number_after_waitlist_is_not_a_length() {
        let rules = rules();
        assert_eq!(rules.waitlist_length.resolve("Waitlist 416-555-1234"), Field::NotFound);
        assert_eq!(rules.waitlist_length.resolve("Waitlist: 416.555.1234"), Field::NotFound);
        assert_eq!(rules.waitlist_length.resolve("Waitlist of 40."), Field::Found(40));
    }

    #[test]
    fn month_ranges_are_canonical() {
        let rules = rules();
        assert_eq!(
            rules.season.resolve("Open from May to October each year"),
            Field::Found("May-October".into())
        );
        assert_eq!(
            rules.season.resolve("Season runs apr. - nov."),
            Field::Found("April-November".into())
        );
        assert_eq!(month_name("Sept"), Some("September"));
    }

    #[test]
    fn ignored_emails_are_skipped() {
        let rules = rules();
        assert!(rules.is_ignored_email("you@example.com"));
        assert_eq!(
            rules.email.resolve("write you@example.com or pro@club.ca"),
            Field::Found("pro@club.ca".into())
        );
    }
}
