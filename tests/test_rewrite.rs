use minisoy::{
    check_escaping_sanity, file_to_source, parse_file, rewrite, ContentKind, DirectiveRegistry,
    Error, ErrorKind, FileSet, PrintDirective,
};
use similar_asserts::assert_eq;

fn registry() -> DirectiveRegistry {
    let mut registry = DirectiveRegistry::new();
    registry.register(PrintDirective::cancelling("customEscapeDirective"));
    registry.register(PrintDirective::new("customOtherDirective"));
    registry.register(PrintDirective::cancelling("noAutoescape"));
    registry.register(PrintDirective::new("bidiSpanWrap").with_output_kind(ContentKind::Html));
    registry
}

fn parse_set(inputs: &[&str]) -> Result<FileSet, Error> {
    let mut files = FileSet::new();
    for (idx, input) in inputs.iter().enumerate() {
        let path = if inputs.len() == 1 {
            "no-path".to_string()
        } else {
            format!("no-path-{idx}")
        };
        files.add_file(parse_file(input, &path)?);
    }
    Ok(files)
}

fn rewritten_source(inputs: &[&str]) -> Result<String, Error> {
    let mut files = parse_set(inputs)?;
    check_escaping_sanity(&files)?;
    rewrite(&mut files, &registry())?;
    Ok(file_to_source(&files.files[0]))
}

/// Like [`rewritten_source`] but without the sanity pass, which would
/// reject the `|text` directives the rewriter itself inserts.
fn rewritten_source_unchecked(inputs: &[&str]) -> Result<String, Error> {
    let mut files = parse_set(inputs)?;
    rewrite(&mut files, &registry())?;
    Ok(file_to_source(&files.files[0]))
}

#[track_caller]
fn assert_rewrite(expected: &str, inputs: &[&str]) {
    let rewritten = rewritten_source(inputs).unwrap();
    assert_eq!(rewritten, expected);

    // the transformation must be idempotent unless derivatives were added
    if !rewritten.contains("__C") {
        let again = rewritten_source_unchecked(&[&rewritten]).unwrap();
        assert_eq!(again, expected);
    }
}

#[track_caller]
fn assert_rewrite_noop(source: &str) {
    assert_rewrite(source, &[source]);
}

#[track_caller]
fn assert_fails(kind: ErrorKind, inputs: &[&str]) {
    let err = rewritten_source(inputs).unwrap_err();
    assert_eq!(err.kind(), kind, "unexpected failure: {err:#}");
}

#[test]
fn test_trivial_template() {
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "Hello, World!\n",
        "{/template}"
    ));
}

#[test]
fn test_print_in_text() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "Hello, {$world |escapeHtml}!\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "Hello, {$world}!\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_print_in_text_and_link() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "Hello,<a href='worlds?world={$world |escapeUri}'>{$world |escapeHtml}</a>!\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "Hello,\n",
            "<a href='worlds?world={$world}'>\n",
            "{$world}\n",
            "</a>!\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_obscure_url_attributes() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<a xml:base='{$x |filterNormalizeUri |escapeHtmlAttribute}' href='/foo'>link</a>",
            "<button formaction='{$x |filterNormalizeUri |escapeHtmlAttribute}'>do</button>",
            "<command icon='{$x |filterNormalizeUri |escapeHtmlAttribute}'></command>",
            "<object data='{$x |filterNormalizeUri |escapeHtmlAttribute}'></object>",
            "<video poster='{$x |filterNormalizeUri |escapeHtmlAttribute}'></video>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<a xml:base='{$x}' href='/foo'>link</a>\n",
            "<button formaction='{$x}'>do</button>\n",
            "<command icon='{$x}'></command>\n",
            "<object data='{$x}'></object>\n",
            "<video poster='{$x}'></video>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_conditional() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "Hello,{if $x == 1}{$y |escapeHtml}",
            "{elseif $x == 2}<script>foo({$z |escapeJsValue})</script>",
            "{else}World!{/if}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "Hello,\n",
            "{if $x == 1}\n",
            "  {$y}\n",
            "{elseif $x == 2}\n",
            "  <script>foo({$z})</script>\n",
            "{else}\n",
            "  World!\n",
            "{/if}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_conditional_ends_in_different_context() {
    // each branch independently closes the tag, so the onclick that
    // follows is ordinary PCDATA and is escaped as such
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<a{if $url} href='{$url |filterNormalizeUri |escapeHtmlAttribute}'>",
            "{elseif $name} name='{$name |escapeHtmlAttribute}'>",
            "{else}>{/if}",
            " onclick='alert({$value |escapeHtml})'\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<a{if $url} href='{$url}'>",
            "{elseif $name} name='{$name}'>",
            "{else}>{/if}",
            " onclick='alert({$value})'\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_broken_conditional() {
    assert_fails(
        ErrorKind::AmbiguousBranches,
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "Hello,\n",
            "{if $x == 1}\n",
            "  {$y}\n",
            "{elseif $x == 2}\n",
            // not closed so the branch ends inside a JS comment
            "  <script>foo({$z})//</scrpit>\n",
            "{else}\n",
            "  World!\n",
            "{/if}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_switch() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "Hello,{switch $x}{case 1}{$y |escapeHtml}",
            "{case 2}<script>foo({$z |escapeJsValue})</script>",
            "{default}World!{/switch}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "Hello,\n",
            "{switch $x}\n",
            "  {case 1}\n",
            "    {$y}\n",
            "  {case 2}\n",
            "    <script>foo({$z})</script>\n",
            "  {default}\n",
            "    World!\n",
            "{/switch}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_broken_switch() {
    assert_fails(
        ErrorKind::AmbiguousBranches,
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "{switch $x}\n",
            "  {case 1}\n",
            "    {$y}\n",
            "  {case 2}\n",
            "    <script>foo({$z})//</scrpit>\n",
            "  {default}\n",
            "    World!\n",
            "{/switch}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_print_inside_script() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<script>",
            "foo({$a |escapeJsValue}); ",
            "bar(\"{$b |escapeJsString}\"); ",
            "baz('{$c |escapeJsString}'); ",
            "boo(/{$d |escapeJsRegex}/.test(s) ? 1 / {$e |escapeJsValue}",
            " : /{$f |escapeJsRegex}/);",
            "</script>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<script>",
            "foo({$a}); ",
            "bar(\"{$b}\"); ",
            "baz('{$c}'); ",
            "boo(/{$d}/.test(s) ? 1 / {$e}",
            " : /{$f}/);",
            "</script>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_print_inside_js_comment_rejected() {
    assert_fails(
        ErrorKind::DirectiveInComment,
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>// {$x}</script>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_js_string_inside_quotes_rejected() {
    assert_fails(
        ErrorKind::IncompatibleEscapingMode,
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>alert('Hello {$world |escapeJsValue}');</script>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_literal() {
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template bar autoescape=\"deprecated-contextual\"}\n",
        "<script>{literal}{$a}{/literal}{lb}$a{rb}</script>\n",
        "{/template}"
    ));
}

#[test]
fn test_for_loop() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<style>{for $i in range($n)}",
            ".foo{$i |filterCssValue}:before {lb}",
            "content: '{$i |escapeCssString}'",
            "{rb}{/for}</style>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<style>\n",
            "{for $i in range($n)}\n",
            "  .foo{$i}:before {lb}\n",
            "    content: '{$i}'\n",
            "  {rb}\n",
            "{/for}",
            "</style>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_broken_for_loop() {
    assert_fails(
        ErrorKind::LoopChangesContext,
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<style>\n",
            "{for $i in range($n)}\n",
            // missing close quote
            "  .foo{$i}:before {lb} content: '{$i} {rb}\n",
            "{/for}\n",
            "</style>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_foreach_loop() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template baz autoescape=\"deprecated-contextual\"}\n",
            "<ol>{foreach $x in $foo}<li>{$x |escapeHtml}</li>{/foreach}</ol>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template baz autoescape=\"deprecated-contextual\"}\n",
            "  <ol>\n",
            "    {foreach $x in $foo}\n",
            "      <li>{$x}</li>\n",
            "    {/foreach}\n",
            "  </ol>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_broken_foreach_loop() {
    assert_fails(
        ErrorKind::LoopChangesContext,
        &[concat!(
            "{namespace ns}\n\n",
            "{template baz autoescape=\"deprecated-contextual\"}\n",
            "  <ol>\n",
            "    {foreach $x in $foo}\n",
            "      <li class={$x}\n",
            "    {/foreach}\n",
            "  </ol>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_foreach_loop_with_ifempty() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template baz autoescape=\"deprecated-contextual\"}\n",
            "<ol>{foreach $x in $foo}<li>{$x |escapeHtml}</li>",
            "{ifempty}<li><i>Nothing</i></li>{/foreach}</ol>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template baz autoescape=\"deprecated-contextual\"}\n",
            "  <ol>\n",
            "    {foreach $x in $foo}\n",
            "      <li>{$x}</li>\n",
            "    {ifempty}\n",
            "      <li><i>Nothing</i></li>\n",
            "    {/foreach}\n",
            "  </ol>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_call() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{call bar data=\"all\" /}\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "Hello, {$world |escapeHtml}!\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "  {call bar data=\"all\" /}\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "  Hello, {$world}!\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_same_template_called_in_different_contexts() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{call bar data=\"all\" /}",
            "<script>",
            "alert('{call bar__C14 data=\"all\" /}');",
            "</script>\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "Hello, {$world |escapeHtml}!\n",
            "{/template}\n\n",
            "{template bar__C14 autoescape=\"deprecated-contextual\"}\n",
            "Hello, {$world |escapeJsString}!\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{call bar data=\"all\" /}\n",
            "<script>\n",
            "alert('{call bar data=\"all\" /}');\n",
            "</script>\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "Hello, {$world}!\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_recursive_template_guess_works() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>x = [{call countDown__C2010 data=\"all\" /}]</script>\n",
            "{/template}\n\n",
            "{template countDown autoescape=\"deprecated-contextual\"}\n",
            "{if $x gt 0}{print --$x |escapeHtml},{call countDown /}{/if}\n",
            "{/template}\n\n",
            "{template countDown__C2010 autoescape=\"deprecated-contextual\"}\n",
            "{if $x gt 0}{print --$x |escapeJsValue},{call countDown__C2010 /}{/if}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>x = [{call countDown data=\"all\" /}]</script>\n",
            "{/template}\n\n",
            "{template countDown autoescape=\"deprecated-contextual\"}\n",
            "{if $x gt 0}{print --$x},{call countDown /}{/if}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_template_with_unknown_js_slash() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>{if $declare}var{sp}{/if}x = {call bar__C2010 /}{\\n}y = 2</script>\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "42{if $declare} , {/if}\n",
            "{/template}\n\n",
            "{template bar__C2010 autoescape=\"deprecated-contextual\"}\n",
            "42{if $declare} , {/if}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>{if $declare}var{sp}{/if}x = {call bar /}{\\n}y = 2</script>\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "42{if $declare} , {/if}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_unknown_js_slash_matters() {
    assert_fails(
        ErrorKind::AmbiguousJsSlash,
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>{if $declare}var{sp}{/if}x = {call bar /}{\\n}/ 2</script>\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "42{if $declare} , {/if}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_url_context_joining() {
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "<a href=\"{if $c}/foo?bar=baz{else}/boo{/if}\">\n",
        "{/template}"
    ));
    assert_fails(
        ErrorKind::AmbiguousUriPart,
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<a href=\"{if $c}/foo?bar=baz&boo={else}/boo/{/if}{$x}\">\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_recursive_template_guess_fails() {
    assert_fails(
        ErrorKind::AmbiguousBranches,
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>{call quot data=\"all\" /}</script>\n",
            "{/template}\n\n",
            "{template quot autoescape=\"deprecated-contextual\"}\n",
            "\" {if $x}{call quot data=\"all\" /}{/if}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_uris() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<a href='{$url |filterNormalizeUri |escapeHtmlAttribute}'",
            " style='background:url({$bgimage |filterNormalizeUri |escapeHtmlAttribute})'>",
            "Hi</a>",
            "<a href='#{$anchor |escapeHtmlAttribute}'",
            " style='background:url(&apos;/pic?q={$file |escapeUri}&apos;)'>",
            "Hi",
            "</a>",
            "<style>",
            "body {lb} background-image: url(\"{$bg |filterNormalizeUri}\"); {rb}",
            "table {lb} border-image: url(\"borders/{$brdr |normalizeUri}\"); {rb}",
            "</style>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template bar autoescape=\"deprecated-contextual\"}\n",
            "<a href='{$url}' style='background:url({$bgimage})'>Hi</a>\n",
            "<a href='#{$anchor}'\n",
            " style='background:url(&apos;/pic?q={$file}&apos;)'>Hi</a>\n",
            "<style>\n",
            "body {lb} background-image: url(\"{$bg}\"); {rb}\n",
            "table {lb} border-image: url(\"borders/{$brdr}\"); {rb}\n",
            "</style>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_css_and_xid_commands() {
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "{css foo}{xid bar}\n",
        "{/template}"
    ));
}

#[test]
fn test_already_escaped() {
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "<script>a = \"{$FOO |escapeUri}\";</script>\n",
        "{/template}"
    ));
}

#[test]
fn test_explicit_noescape_noop() {
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "<script>a = \"{$FOO |noAutoescape}\";</script>\n",
        "{/template}"
    ));
}

#[test]
fn test_custom_directives() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{$x |customEscapeDirective} - {$y |customOtherDirective |escapeHtml}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{$x |customEscapeDirective} - {$y |customOtherDirective}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_extern_templates() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>var x = {call bar /},y = {$y |escapeJsValue};</script>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>var x = {call bar /},y = {$y};</script>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_no_interference_with_non_contextual_templates() {
    // a broken non-contextual template that calls into contextual land is
    // our problem
    let err = rewritten_source(&[concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "Hello {$world}\n",
        "{/template}\n\n",
        "{template bad autoescape=\"deprecated-noncontextual\"}\n",
        "{if $x}<!--{/if}{call foo /}\n",
        "{/template}"
    )])
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousBranches);

    // but if it stays on its side it is none of our business
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "Hello {$world |escapeHtml}\n",
        "{/template}\n\n",
        "{template bad autoescape=\"deprecated-noncontextual\"}\n",
        "{if $x}<!--{/if}\n",
        "{/template}"
    ));
}

#[test]
fn test_non_contextual_callers() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "{$x |escapeHtml}\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-noncontextual\"}\n",
            "<b>{call foo /}</b> {$y}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "{$x}\n",
            "{/template}\n\n",
            "{template bar autoescape=\"deprecated-noncontextual\"}\n",
            "<b>{call foo /}</b> {$y}\n",
            "{/template}"
        )],
    );

    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template .foo autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "{$x |escapeHtml}\n",
            "{/template}\n\n",
            "{template .bar autoescape=\"deprecated-noautoescape\"}\n",
            "<b>{call .foo /}</b> {$y}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template .foo autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "{$x}\n",
            "{/template}\n\n",
            "{template .bar autoescape=\"deprecated-noautoescape\"}\n",
            "<b>{call .foo /}</b> {$y}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_unquoted_attributes() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<button onclick=alert({$msg |escapeJsValue |escapeHtmlAttributeNospace})>",
            "Launch</button>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<button onclick=alert({$msg})>Launch</button>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_messages_with_embedded_tags() {
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "{msg desc=\"Say hello\"}Hello, <b>World</b>{/msg}\n",
        "{/template}"
    ));
}

#[test]
fn test_namespaces() {
    assert_rewrite(
        concat!(
            "{namespace soy.examples.codelab}\n\n",
            "{template .main autoescape=\"deprecated-contextual\"}\n",
            "<title>{call .pagenum__C81 data=\"all\" /}</title>",
            "<script>",
            "var pagenum = \"{call .pagenum__C13 data=\"all\" /}\"; ",
            "...",
            "</script>\n",
            "{/template}\n\n",
            "{template .pagenum autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "{$pageIndex |escapeHtml} of {$pageCount |escapeHtml}\n",
            "{/template}\n\n",
            "{template .pagenum__C81 autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "{$pageIndex |escapeHtmlRcdata} of {$pageCount |escapeHtmlRcdata}\n",
            "{/template}\n\n",
            "{template .pagenum__C13 autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "{$pageIndex |escapeJsString} of {$pageCount |escapeJsString}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace soy.examples.codelab}\n\n",
            "{template .main autoescape=\"deprecated-contextual\"}\n",
            "  <title>{call .pagenum data=\"all\" /}</title>\n",
            "  <script>\n",
            "    var pagenum = \"{call name=\".pagenum\" data=\"all\" /}\"; \n",
            "    ...\n",
            "  </script>\n",
            "{/template}\n\n",
            "{template .pagenum autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "  {$pageIndex} of {$pageCount}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_conditional_attributes() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<div{if $className} class=\"{$className |escapeHtmlAttribute}\"{/if}>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<div{if $className} class=\"{$className}\"{/if}>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_extra_spaces_in_tag() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<div {if $className} class=\"{$className |escapeHtmlAttribute}\"{/if} id=x>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<div {if $className} class=\"{$className}\"{/if} id=x>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_optional_attributes() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template iconTemplate autoescape=\"deprecated-contextual\"}\n",
            "<img class=\"{$iconClass |escapeHtmlAttribute}\"",
            "{if $iconId} id=\"{$iconId |escapeHtmlAttribute}\"{/if}",
            " src=",
            "{if $iconPath}\"{$iconPath |filterNormalizeUri |escapeHtmlAttribute}\"",
            "{else}\"images/cleardot.gif\"{/if}",
            "{if $title} title=\"{$title |escapeHtmlAttribute}\"{/if}",
            " alt=\"",
            "{if $alt || $alt == ''}{$alt |escapeHtmlAttribute}",
            "{elseif $title}{$title |escapeHtmlAttribute}{/if}\"",
            ">\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template name=\"iconTemplate\" autoescape=\"deprecated-contextual\"}\n",
            "<img class=\"{$iconClass}\"",
            "{if $iconId} id=\"{$iconId}\"{/if}",
            " src=",
            "{if $iconPath}\"{$iconPath}\"",
            "{else}\"images/cleardot.gif\"{/if}",
            "{if $title} title=\"{$title}\"{/if}",
            " alt=\"",
            "{if $alt || $alt == ''}{$alt}",
            "{elseif $title}{$title}{/if}\"",
            ">\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_dynamic_attr_name() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<img src=\"bar\" {$baz |filterHtmlAttributes}=\"boo\">\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<img src=\"bar\" {$baz}=\"boo\">\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_dynamic_attributes() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<img src=\"bar\" {$baz |filterHtmlAttributes}>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<img src=\"bar\" {$baz}>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_dynamic_element_name() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<h{$headerLevel |filterHtmlElementName}>Header",
            "</h{$headerLevel |filterHtmlElementName}>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<h{$headerLevel}>Header</h{$headerLevel}>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_optional_valueless_attributes() {
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template foo autoescape=\"deprecated-contextual\"}\n",
        "<input {if $c}checked{/if}>",
        "<input {if $c}id={$id |customEscapeDirective}{/if}>\n",
        "{/template}"
    ));
}

#[test]
fn test_directives_ordered_properly() {
    // |bidiSpanWrap produces HTML, so |escapeHtml runs before it
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{$x |escapeHtml |bidiSpanWrap}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{$x |bidiSpanWrap}\n",
            "{/template}"
        )],
    );

    // but in a non-HTML context there is no reordering
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>var html = {$x |bidiSpanWrap |escapeJsValue}</script>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "<script>var html = {$x |bidiSpanWrap}</script>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_delegate_templates_are_escaped() {
    assert_rewrite(
        concat!(
            "{delpackage dp}\n",
            "{namespace ns}\n\n",
            "{deltemplate foo autoescape=\"deprecated-contextual\"}\n",
            "{$x |escapeHtml}\n",
            "{/deltemplate}"
        ),
        &[concat!(
            "{delpackage dp}\n",
            "{namespace ns}\n\n",
            "{deltemplate foo autoescape=\"deprecated-contextual\"}\n",
            "{$x}\n",
            "{/deltemplate}"
        )],
    );
}

#[test]
fn test_delegate_called_in_non_pcdata_context() {
    assert_rewrite(
        concat!(
            "{delpackage dp}\n",
            "{namespace ns}\n\n",
            "{template main autoescape=\"deprecated-contextual\"}\n",
            "<script>{delcall foo__C2010 /}</script>\n",
            "{/template}\n\n",
            "{deltemplate foo autoescape=\"deprecated-contextual\"}\n",
            "x = {$x |escapeHtml}\n",
            "{/deltemplate}\n\n",
            "{deltemplate foo__C2010 autoescape=\"deprecated-contextual\"}\n",
            "x = {$x |escapeJsValue}\n",
            "{/deltemplate}"
        ),
        &[concat!(
            "{delpackage dp}\n",
            "{namespace ns}\n\n",
            "{template main autoescape=\"deprecated-contextual\"}\n",
            "<script>{delcall foo /}</script>\n",
            "{/template}\n\n",
            "{deltemplate foo autoescape=\"deprecated-contextual\"}\n",
            "x = {$x |escapeHtml}\n",
            "{/deltemplate}"
        )],
    );
}

#[test]
fn test_delegate_return_types_unioned() {
    assert_fails(
        ErrorKind::AmbiguousJsSlash,
        &[
            concat!(
                "{namespace ns}\n\n",
                "{template main autoescape=\"deprecated-contextual\"}\n",
                "<script>{delcall foo}{param x: '' /}{/delcall}\n",
                // intended as a regex, but only one delegate version ends
                // with a statement terminator
                "/foo/i.test(s) && alert(s);</script>\n",
                "{/template}"
            ),
            concat!(
                "{delpackage dp1}\n",
                "{namespace ns}\n\n",
                "{deltemplate foo autoescape=\"deprecated-contextual\"}\n",
                "x = {$x};\n",
                "{/deltemplate}"
            ),
            concat!(
                "{delpackage dp2}\n",
                "{namespace ns}\n\n",
                "{deltemplate foo autoescape=\"deprecated-contextual\"}\n",
                "x = {$x}\n",
                "{/deltemplate}"
            ),
        ],
    );
}

#[test]
fn test_typed_let_block_is_contextually_escaped() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "<script> var y = '",
            "{let $l kind=\"html\"}<div>{$y |escapeHtml}</div>{/let}",
            "{$y |escapeJsString}'</script>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "<script> var y = '",
            "{let $l kind=\"html\"}<div>{$y}</div>{/let}",
            "{$y}'</script>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_untyped_let_block_is_contextually_escaped() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "<script> var y = '",
            "{let $l}<div>{$y |escapeJsString}</div>{/let}",
            "{$y |escapeJsString}'</script>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "<script> var y = '",
            "{let $l}<div>{$y}</div>{/let}",
            "{$y}'</script>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_typed_let_block_must_end_in_start_context() {
    assert_fails(
        ErrorKind::StrictBlockBadEnd,
        &[concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "{let $l kind=\"html\"}<script> var y ='{$y}';{/let}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_typed_let_block_is_strict_mode_autoescaped() {
    assert_fails(
        ErrorKind::StrictForbidsCancellingDirective,
        &[concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "{let $l kind=\"html\"}<b>{$y |customEscapeDirective}</b>{/let}\n",
            "{/template}"
        )],
    );

    assert_fails(
        ErrorKind::StrictForbidsNonStrictCall,
        &[concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "{let $l kind=\"html\"}<b>{call .other data=\"all\" /}</b>{/let}\n",
            "{/template}\n\n",
            "{template .other autoescape=\"deprecated-contextual\"}\n",
            "Hello World\n",
            "{/template}"
        )],
    );

    // non-cancelling directives are fine
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "{let $l kind=\"html\"}<b>{$y |customOtherDirective |escapeHtml}</b>{/let}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template t autoescape=\"deprecated-contextual\"}\n",
            "{let $l kind=\"html\"}<b>{$y |customOtherDirective}</b>{/let}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_non_typed_param_must_end_in_html_context() {
    assert_fails(
        ErrorKind::BlockBadEnd,
        &[concat!(
            "{namespace ns}\n\n",
            "{template caller autoescape=\"deprecated-contextual\"}\n",
            "{call callee}{param foo}<a href='{/param}{/call}\n",
            "{/template}\n\n",
            "{template callee autoescape=\"deprecated-contextual\"}\n",
            "<b>{$foo}</b>\n",
            "{/template}"
        )],
    );

    assert_fails(
        ErrorKind::BlockBadEnd,
        &[concat!(
            "{namespace ns}\n\n",
            "{template caller autoescape=\"deprecated-contextual\"}\n",
            "{call callee}{param foo}<script>var x={/param}{/call}\n",
            "{/template}\n\n",
            "{template callee autoescape=\"deprecated-contextual\"}\n",
            "<b>{$foo}</b>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_non_typed_param_gets_contextually_autoescaped() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template caller autoescape=\"deprecated-contextual\"}\n",
            "{call callee}{param fooHtml}",
            "<a href=\"http://google.com/search?q={$query |escapeUri}\"",
            " onclick=\"alert('{$query |escapeJsString |escapeHtmlAttribute}')\">",
            "Search for {$query |escapeHtml}",
            "</a>",
            "{/param}{/call}\n",
            "{/template}\n\n",
            "{template callee autoescape=\"deprecated-contextual\"}\n",
            "{$fooHTML |noAutoescape}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template caller autoescape=\"deprecated-contextual\"}\n",
            "{call callee}{param fooHtml}",
            "<a href=\"http://google.com/search?q={$query}\"",
            " onclick=\"alert('{$query}')\">",
            "Search for {$query}",
            "</a>",
            "{/param}{/call}\n",
            "{/template}\n\n",
            "{template callee autoescape=\"deprecated-contextual\"}\n",
            "{$fooHTML |noAutoescape}\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_typed_param_block_is_contextually_escaped() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template caller autoescape=\"deprecated-contextual\"}\n",
            "<div>{call callee}{param x kind=\"html\"}",
            "<script> var y ='{$y |escapeJsString}';</script>",
            "{/param}{/call}</div>\n",
            "{/template}\n\n",
            "{template callee autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "<b>{$x |escapeHtml}</b>\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template caller autoescape=\"deprecated-contextual\"}\n",
            "<div>{call callee}{param x kind=\"html\"}",
            "<script> var y ='{$y}';</script>",
            "{/param}{/call}</div>\n",
            "{/template}\n\n",
            "{template callee autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "<b>{$x}</b>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_typed_param_block_must_end_in_start_context() {
    assert_fails(
        ErrorKind::StrictBlockBadEnd,
        &[concat!(
            "{namespace ns}\n\n",
            "{template caller autoescape=\"deprecated-contextual\"}\n",
            "<div>{call callee}{param x kind=\"html\"}<script> var y ='{$y}';{/param}{/call}</div>\n",
            "{/template}\n\n",
            "{template callee autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "<b>{$x}</b>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_transitional_typed_param_block() {
    // in contextual templates, typed param blocks tolerate |noAutoescape so
    // callees can migrate to strict before their callers do
    assert_rewrite_noop(concat!(
        "{namespace ns}\n\n",
        "{template caller autoescape=\"deprecated-contextual\"}\n",
        "<div>{call callee}{param x kind=\"html\"}<b>{$y |noAutoescape}</b>{/param}{/call}</div>\n",
        "{/template}\n\n",
        "{template callee autoescape=\"deprecated-contextual\" private=\"true\"}\n",
        "<b>{$x |escapeHtml}</b>\n",
        "{/template}"
    ));

    // other cancelling directives are still rejected
    assert_fails(
        ErrorKind::StrictForbidsCancellingDirective,
        &[concat!(
            "{namespace ns}\n\n",
            "{template caller autoescape=\"deprecated-contextual\"}\n",
            "<div>{call callee}{param x kind=\"html\"}<b>{$y |customEscapeDirective}</b>{/param}{/call}</div>\n",
            "{/template}\n\n",
            "{template callee autoescape=\"deprecated-contextual\" private=\"true\"}\n",
            "<b>{$x}</b>\n",
            "{/template}"
        )],
    );
}

#[test]
fn test_typed_text_let_block() {
    assert_rewrite(
        concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{let $a kind=\"text\"}",
            "Hello {$x |text} <{$y |text}, \"{$z |text}\">",
            "{/let}{$a |escapeHtml}\n",
            "{/template}"
        ),
        &[concat!(
            "{namespace ns}\n\n",
            "{template foo autoescape=\"deprecated-contextual\"}\n",
            "{let $a kind=\"text\"}",
            "Hello {$x} <{$y}, \"{$z}\">",
            "{/let}{$a}\n",
            "{/template}"
        )],
    );
}
