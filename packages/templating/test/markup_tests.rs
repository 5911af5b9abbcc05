//! Markup Tests
//!
//! Parsing template markup into the document and writing it back out

#[cfg(test)]
mod tests {
    use aurelia_templating::dom::markup::ParseError;
    use aurelia_templating::{Document, NodeType, TemplatingError};

    fn round_trip(markup: &str) -> String {
        let doc = Document::new();
        let fragment = doc.parse_fragment(markup).unwrap();
        doc.to_html(fragment)
    }

    fn parse_error(markup: &str) -> ParseError {
        Document::new().parse_fragment(markup).unwrap_err()
    }

    mod elements {
        use super::*;

        #[test]
        fn should_lower_case_tag_and_attribute_names() {
            assert_eq!(
                round_trip(r#"<DIV Class="a"><Span>x</Span></DIV>"#),
                r#"<div class="a"><span>x</span></div>"#
            );
        }

        #[test]
        fn should_not_give_void_elements_children() {
            let doc = Document::new();
            let fragment = doc.parse_fragment("<p><input value=1>after</p>").unwrap();
            let p = doc.first_child(fragment).unwrap();
            let children = doc.child_nodes(p);

            assert_eq!(children.len(), 2);
            assert!(!doc.has_child_nodes(children[0]));
            assert_eq!(doc.node_type(children[1]), NodeType::Text);
        }

        #[test]
        fn should_close_self_closing_custom_elements() {
            assert_eq!(
                round_trip("<my-panel/><p>x</p>"),
                "<my-panel></my-panel><p>x</p>"
            );
        }

        #[test]
        fn should_close_unclosed_elements_at_end_of_input() {
            assert_eq!(round_trip("<ul><li>a"), "<ul><li>a</li></ul>");
        }

        #[test]
        fn should_keep_template_children_as_content() {
            let doc = Document::new();
            let template = doc
                .create_template_from_markup("<template><b>x</b></template>")
                .unwrap();
            assert!(doc.is_element_named(template, "template"));
            assert_eq!(doc.inner_html(template), "<b>x</b>");
            assert_eq!(doc.parent(template), None);
        }
    }

    mod attributes {
        use super::*;

        #[test]
        fn should_parse_quoted_unquoted_and_boolean_attributes() {
            let doc = Document::new();
            let fragment = doc
                .parse_fragment(r#"<input a="1" b='2' c=3 disabled>"#)
                .unwrap();
            let input = doc.first_child(fragment).unwrap();

            assert_eq!(doc.get_attribute(input, "a").as_deref(), Some("1"));
            assert_eq!(doc.get_attribute(input, "b").as_deref(), Some("2"));
            assert_eq!(doc.get_attribute(input, "c").as_deref(), Some("3"));
            assert_eq!(doc.get_attribute(input, "disabled").as_deref(), Some(""));
        }

        #[test]
        fn should_keep_binding_syntax_in_names() {
            let doc = Document::new();
            let fragment = doc
                .parse_fragment(r#"<input value.two-way="name" click.trigger="save()">"#)
                .unwrap();
            let input = doc.first_child(fragment).unwrap();
            let names: Vec<String> = doc.attributes(input).into_iter().map(|a| a.name).collect();

            assert_eq!(names, vec!["value.two-way", "click.trigger"]);
        }

        #[test]
        fn should_keep_the_first_duplicate_attribute() {
            assert_eq!(round_trip(r#"<a id="1" id="2"></a>"#), r#"<a id="1"></a>"#);
        }

        #[test]
        fn should_decode_entities_in_values() {
            let doc = Document::new();
            let fragment = doc.parse_fragment(r#"<a title="a &amp; b &quot;c&quot;"></a>"#).unwrap();
            let a = doc.first_child(fragment).unwrap();
            assert_eq!(doc.get_attribute(a, "title").as_deref(), Some("a & b \"c\""));
        }
    }

    mod text_and_comments {
        use super::*;

        #[test]
        fn should_decode_and_re_escape_text() {
            assert_eq!(round_trip("<p>1 &lt; 2 &amp;&amp; 3</p>"), "<p>1 &lt; 2 &amp;&amp; 3</p>");
        }

        #[test]
        fn should_keep_comments() {
            let doc = Document::new();
            let fragment = doc.parse_fragment("<!--<view>--><i></i><!--</view>-->").unwrap();
            let first = doc.first_child(fragment).unwrap();

            assert_eq!(doc.node_type(first), NodeType::Comment);
            assert_eq!(doc.text(first).as_deref(), Some("<view>"));
            assert_eq!(doc.to_html(fragment), "<!--<view>--><i></i><!--</view>-->");
        }

        #[test]
        fn should_treat_a_lone_angle_bracket_as_text() {
            assert_eq!(round_trip("<p>a < b</p>"), "<p>a &lt; b</p>");
        }

        #[test]
        fn should_keep_interpolation_text_intact() {
            let doc = Document::new();
            let fragment = doc.parse_fragment("<span>Hello ${name}!</span>").unwrap();
            assert_eq!(doc.text_content(fragment), "Hello ${name}!");
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn should_report_unexpected_closing_tags() {
            let err = parse_error("<div></span></div>");
            assert_eq!(err.msg, "Unexpected closing tag \"span\"");
            assert_eq!((err.location.line, err.location.col), (1, 6));
        }

        #[test]
        fn should_report_unterminated_attribute_values() {
            let err = parse_error("<div title=\"open></div>");
            assert_eq!(err.msg, "Unterminated value for \"title\"");
        }

        #[test]
        fn should_require_a_template_root() {
            let doc = Document::new();
            let err = doc.create_template_from_markup("<div></div>").unwrap_err();
            assert!(matches!(err, TemplatingError::MissingTemplateElement));
        }

        #[test]
        fn should_wrap_parse_errors() {
            let doc = Document::new();
            let err = doc.create_template_from_markup("<template><!-- open").unwrap_err();
            assert!(matches!(err, TemplatingError::Markup(_)));
            assert!(err.to_string().starts_with("Unterminated comment at 1:11"));
        }
    }
}
