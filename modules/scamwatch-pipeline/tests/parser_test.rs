//! Thread parser against rendered-markdown fixtures, one per layout.

use scamwatch_pipeline::parser::{parse_thread, ParseError};

const CLASSIC: &str = include_str!("fixtures/classic_thread.md");
const MODERN: &str = include_str!("fixtures/modern_thread.md");

const CLASSIC_URL: &str =
    "https://old.reddit.com/r/travel/comments/1abc23/taxi_driver_in_bangkok_refused_the_meter/";
const MODERN_URL: &str =
    "https://www.reddit.com/r/solotravel/comments/1xyz99/fake_police_passport_check_in_lombok/";

#[test]
fn classic_layout_yields_post_and_comments() {
    let parsed = parse_thread(CLASSIC, CLASSIC_URL).unwrap();
    let post = &parsed.post;

    assert_eq!(post.external_id, "1abc23");
    assert_eq!(post.channel, "travel");
    assert_eq!(post.author, "wanderlust_jo");
    assert_eq!(
        post.title,
        "Taxi driver in Bangkok refused the meter and charged us 1500 baht"
    );
    assert!(post.body.starts_with("We got into a taxi outside the Grand Palace"));
    assert!(post.body.ends_with("only use metered taxis or Grab."));
    assert!(!post.body.contains("share"));
    assert_eq!(post.score, 128);
    assert_eq!(post.num_comments, 3);
    assert_eq!(
        post.permalink,
        "/r/travel/comments/1abc23/taxi_driver_in_bangkok_refused_the_meter/"
    );

    assert_eq!(parsed.comments.len(), 3);
    assert_eq!(parsed.comments[0].external_id, "kx1aa1");
    assert_eq!(parsed.comments[0].author, "bkk_local");
    assert_eq!(parsed.comments[0].score, 45);
    assert_eq!(
        parsed.comments[1].body,
        "Same thing happened to me in Pattaya, lost about $40."
    );
    // No permalink on the last comment: a content-derived ID is used.
    assert!(parsed.comments[2].external_id.starts_with("md"));
}

#[test]
fn modern_layout_yields_post_and_comments() {
    let parsed = parse_thread(MODERN, MODERN_URL).unwrap();
    let post = &parsed.post;

    assert_eq!(post.external_id, "1xyz99");
    assert_eq!(post.channel, "solotravel");
    assert_eq!(post.author, "nomad_ellie");
    assert!(post.title.starts_with("Fake police"));
    assert!(post.body.contains("pay a fine on the spot"));
    assert!(!post.body.contains("Upvote"));

    let authors: Vec<&str> = parsed.comments.iter().map(|c| c.author.as_str()).collect();
    assert_eq!(authors, ["island_hopper", "gili_guide"]);
    assert_eq!(
        parsed.comments[0].body,
        "Classic scam. Real police will take you to the station, never ask for cash."
    );
    assert_eq!(post.num_comments, 2);
}

#[test]
fn comment_ids_are_stable_across_parses() {
    let first = parse_thread(MODERN, MODERN_URL).unwrap();
    let second = parse_thread(MODERN, MODERN_URL).unwrap();
    let ids = |p: &scamwatch_pipeline::parser::ParsedPost| {
        p.comments.iter().map(|c| c.external_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn thread_url_is_required() {
    let err = parse_thread(CLASSIC, "https://old.reddit.com/r/travel/").unwrap_err();
    assert!(matches!(err, ParseError::MissingPostId(_)));
}

#[test]
fn heading_without_title_text_is_missing_title() {
    let md = "r/travel\n\nu/someone\n\n# \n\nBody text";
    let err = parse_thread(md, "https://www.reddit.com/r/travel/comments/abc/x/").unwrap_err();
    assert_eq!(err, ParseError::MissingTitle);
}

#[test]
fn comment_header_above_byline_is_ignored() {
    let md = "[-] [bob](https://old.reddit.com/user/bob) 5 points 1 hour ago\n\n\
              # [Taxi scam](https://old.reddit.com/r/travel/comments/abc/taxi/)\n\n\
              submitted 2 hours ago by [alice](https://old.reddit.com/user/alice)\n\n\
              The driver took the long way round.";
    let parsed = parse_thread(md, "https://old.reddit.com/r/travel/comments/abc/taxi/").unwrap();

    assert_eq!(parsed.post.title, "Taxi scam");
    assert_eq!(parsed.post.author, "alice");
    assert_eq!(parsed.post.body, "The driver took the long way round.");
    assert!(parsed.comments.is_empty());
}
