use minisoy::context::{AttrKind, Context, Delim, ElementKind, JsSlash, State, UriPart};
use minisoy::process_raw_text;

fn advance(ctx: Context, text: &str) -> Context {
    process_raw_text(ctx, text).unwrap()
}

#[test]
fn test_plain_text_stays_pcdata() {
    let ctx = advance(Context::default(), "Hello, World! 1 < 2 but 3 > 2");
    assert_eq!(ctx, Context::default());
}

#[test]
fn test_open_tag() {
    let ctx = advance(Context::default(), "<a");
    assert_eq!(ctx.state, State::HtmlTagName);
    assert_eq!(ctx.element, ElementKind::Normal);

    let ctx = advance(Context::default(), "<a href=");
    assert_eq!(ctx.state, State::HtmlBeforeAttrValue);
    assert_eq!(ctx.attr, AttrKind::Uri);

    let ctx = advance(Context::default(), "<a href='");
    assert_eq!(ctx.state, State::Uri);
    assert_eq!(ctx.delim, Delim::SingleQuote);
    assert_eq!(ctx.uri_part, UriPart::Start);

    let ctx = advance(Context::default(), "<a href='/search?q=");
    assert_eq!(ctx.uri_part, UriPart::Query);

    let ctx = advance(Context::default(), "<a href='#");
    assert_eq!(ctx.uri_part, UriPart::Fragment);

    let ctx = advance(Context::default(), "<a href='/foo'>");
    assert_eq!(ctx, Context::default());
}

#[test]
fn test_script_element() {
    let ctx = advance(Context::default(), "<script>");
    assert_eq!(ctx.state, State::Js);
    assert_eq!(ctx.slash, JsSlash::Regex);

    let ctx = advance(Context::default(), "<script>var x = 1");
    assert_eq!(ctx.slash, JsSlash::DivOp);

    let ctx = advance(Context::default(), "<script>var x = 1;");
    assert_eq!(ctx.slash, JsSlash::Regex);

    let ctx = advance(Context::default(), "<script>var x = 'foo");
    assert_eq!(ctx.state, State::JsSqString);

    let ctx = advance(Context::default(), "<script>var x = \"foo\\\"bar");
    assert_eq!(ctx.state, State::JsDqString);

    let ctx = advance(Context::default(), "<script>return /foo");
    assert_eq!(ctx.state, State::JsRegex);

    let ctx = advance(Context::default(), "<script>x = 1 + /foo/.test(s)");
    assert_eq!(ctx.state, State::Js);
    assert_eq!(ctx.slash, JsSlash::DivOp);

    let ctx = advance(Context::default(), "<script>// comment");
    assert_eq!(ctx.state, State::JsLineComment);

    let ctx = advance(Context::default(), "<script>/* comment */");
    assert_eq!(ctx.state, State::Js);

    let ctx = advance(Context::default(), "<script>foo();</script>");
    assert_eq!(ctx, Context::default());

    // a typo in the close tag keeps us inside the script
    let ctx = advance(Context::default(), "<script>foo();</scrpit>");
    assert_eq!(ctx.state, State::Js);
}

#[test]
fn test_style_element() {
    let ctx = advance(Context::default(), "<style>");
    assert_eq!(ctx.state, State::Css);

    let ctx = advance(Context::default(), "<style>p { color: '");
    assert_eq!(ctx.state, State::CssSqString);

    let ctx = advance(Context::default(), "<style>/* ");
    assert_eq!(ctx.state, State::CssComment);

    let ctx = advance(Context::default(), "<style>body { background: url(");
    assert_eq!(ctx.state, State::CssUri);
    assert_eq!(ctx.uri_part, UriPart::Start);

    let ctx = advance(Context::default(), "<style>body { background: url(\"x/");
    assert_eq!(ctx.state, State::CssDqUri);
    assert_eq!(ctx.uri_part, UriPart::PreQuery);

    let ctx = advance(Context::default(), "<style>p {} </style>done");
    assert_eq!(ctx, Context::default());
}

#[test]
fn test_rcdata_elements() {
    let ctx = advance(Context::default(), "<title>Hello <b> this is text");
    assert_eq!(ctx.state, State::HtmlRcdata);
    assert_eq!(ctx.element, ElementKind::Title);

    let ctx = advance(Context::default(), "<textarea>foo</textarea>");
    assert_eq!(ctx, Context::default());

    let ctx = advance(Context::default(), "<title>x</title>");
    assert_eq!(ctx, Context::default());
}

#[test]
fn test_html_comment() {
    let ctx = advance(Context::default(), "<!-- hi there ");
    assert_eq!(ctx.state, State::HtmlComment);

    let ctx = advance(Context::default(), "<!-- hi --> there");
    assert_eq!(ctx, Context::default());
}

#[test]
fn test_unquoted_attr_value_ends_at_space() {
    let ctx = advance(Context::default(), "<button onclick=alert(1)");
    assert_eq!(ctx.state, State::Js);
    assert_eq!(ctx.delim, Delim::SpaceOrTagEnd);
    assert_eq!(ctx.attr, AttrKind::Script);

    let ctx = advance(Context::default(), "<button onclick=alert(1) ");
    assert_eq!(ctx.state, State::HtmlTag);

    let ctx = advance(Context::default(), "<button onclick=alert(1)>");
    assert_eq!(ctx, Context::default());
}

#[test]
fn test_attr_delimiter_beats_embedded_grammar() {
    // the html tokenizer ends the attribute at the quote even though the
    // JS lexer is inside a string
    let ctx = advance(Context::default(), "<a onclick='alert(\"x");
    assert_eq!(ctx.state, State::JsDqString);
    let ctx = advance(ctx, "'");
    assert_eq!(ctx.state, State::HtmlTag);
}

#[test]
fn test_void_element() {
    let ctx = advance(Context::default(), "<img src='x.png'>");
    assert_eq!(ctx, Context::default());
}

#[test]
fn test_ambiguous_slash_is_an_error() {
    let div = Context {
        state: State::Js,
        slash: JsSlash::DivOp,
        ..Context::default()
    };
    let regex = Context {
        state: State::Js,
        slash: JsSlash::Regex,
        ..Context::default()
    };
    let joined = Context::join(div, regex).unwrap();
    assert_eq!(joined.slash, JsSlash::Unknown);
    let err = process_raw_text(joined, "/ 2").unwrap_err();
    assert_eq!(err.kind(), minisoy::ErrorKind::AmbiguousJsSlash);
    // tokens other than a slash resolve the ambiguity
    let ctx = advance(joined, "x / 2");
    assert_eq!(ctx.slash, JsSlash::DivOp);
}
