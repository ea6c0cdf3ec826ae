// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const DIR: &str = "/repository/suite";

#[test]
fn single_ats_line() {
    let plan = parse("ats /a.ats\n", DIR).unwrap();
    assert_eq!(plan.roots.len(), 1);
    let node = &plan.roots[0];
    assert_eq!(
        node.kind,
        PlanNodeKind::Ats {
            path: "/repository/a.ats".to_string(),
            groups: vec![],
        }
    );
    assert_eq!(node.branch, Branch::Unconditional);
    assert_eq!(node.name(), "a.ats");
}

#[test]
fn relative_paths_resolve_against_the_campaign_dir() {
    let plan = parse("ats nested/a.ats\n", DIR).unwrap();
    assert_eq!(
        plan.roots[0].kind,
        PlanNodeKind::Ats {
            path: "/repository/suite/nested/a.ats".to_string(),
            groups: vec![],
        }
    );
}

#[test]
fn branches_default_to_success_below_a_parent() {
    let source = "\
ats /a.ats
\ton_error ats /b.ats
\tats /c.ats
\t* ats /d.ats
\ton_success ats /e.ats
";
    let plan = parse(source, DIR).unwrap();
    assert_eq!(plan.roots.len(), 1);
    let a = &plan.roots[0];
    assert_eq!(a.children.len(), 4);
    assert_eq!(a.children[0].branch, Branch::Error);
    assert_eq!(a.children[1].branch, Branch::Success);
    assert_eq!(a.children[2].branch, Branch::Error, "* aliases on_error");
    assert_eq!(a.children[3].branch, Branch::Success);
}

#[test]
fn root_lines_are_unconditional_even_with_a_branch_keyword() {
    let plan = parse("on_error ats /a.ats\n", DIR).unwrap();
    assert_eq!(plan.roots[0].branch, Branch::Unconditional);
}

#[test]
fn indentation_builds_a_tree() {
    let source = "\
ats /a.ats
 ats /b.ats
  ats /c.ats
 ats /d.ats
ats /e.ats
";
    let plan = parse(source, DIR).unwrap();
    assert_eq!(plan.roots.len(), 2);
    let a = &plan.roots[0];
    assert_eq!(a.name(), "a.ats");
    assert_eq!(a.children.len(), 2);
    assert_eq!(a.children[0].name(), "b.ats");
    assert_eq!(a.children[0].children[0].name(), "c.ats");
    assert_eq!(a.children[1].name(), "d.ats");
    assert_eq!(plan.roots[1].name(), "e.ats");
}

#[test]
fn dedent_by_several_levels_at_once() {
    let source = "\
ats /a.ats
\tats /b.ats
\t\tats /c.ats
ats /d.ats
";
    let plan = parse(source, DIR).unwrap();
    assert_eq!(plan.roots.len(), 2);
    assert_eq!(plan.roots[1].name(), "d.ats");
}

#[test]
fn indent_increase_of_more_than_one_is_rejected() {
    let source = "\
ats /a.ats
\t\tats /b.ats
";
    assert!(matches!(
        parse(source, DIR),
        Err(CampaignParseError::IndentTooDeep { line: 2 })
    ));
}

#[test]
fn initial_indent_is_rejected() {
    assert!(matches!(
        parse("\tats /a.ats\n", DIR),
        Err(CampaignParseError::InvalidInitialIndent { line: 1 })
    ));
}

#[test]
fn invalid_type_is_rejected() {
    assert!(matches!(
        parse("job /a.ats\n", DIR),
        Err(CampaignParseError::InvalidType { line: 1, .. })
    ));
}

#[test]
fn comments_and_blank_lines_are_skipped() {
    let source = "\
# a comment
ats /a.ats # trailing comment

\tats /b.ats
";
    let plan = parse(source, DIR).unwrap();
    assert_eq!(plan.roots.len(), 1);
    assert_eq!(plan.roots[0].children.len(), 1);
}

#[test]
fn groups_only_on_ats_lines() {
    let plan = parse("ats /a.ats groups sanity,smoke\n", DIR).unwrap();
    assert_eq!(
        plan.roots[0].kind,
        PlanNodeKind::Ats {
            path: "/repository/a.ats".to_string(),
            groups: vec!["sanity".to_string(), "smoke".to_string()],
        }
    );
}

#[test]
fn mapping_is_parsed_into_parameters() {
    let plan = parse("ats /a.ats with PX_HOST=sut-1,PX_PORT=5060\n", DIR).unwrap();
    let mapping = &plan.roots[0].mapping;
    assert_eq!(mapping.get("PX_HOST").map(String::as_str), Some("sut-1"));
    assert_eq!(mapping.get("PX_PORT").map(String::as_str), Some("5060"));
}

#[test]
fn group_children_are_unconditional() {
    let source = "\
group parallel_phase
\tats /a.ats
\ton_error ats /b.ats
";
    let plan = parse(source, DIR).unwrap();
    let group = &plan.roots[0];
    assert_eq!(
        group.kind,
        PlanNodeKind::Group {
            name: "parallel_phase".to_string()
        }
    );
    assert_eq!(group.name(), "<<group:parallel_phase>>");
    assert_eq!(group.children.len(), 2);
    assert!(group
        .children
        .iter()
        .all(|c| c.branch == Branch::Unconditional));
}

#[test]
fn campaign_children_nest() {
    let source = "\
campaign /sub/main.campaign
\tats /x.ats
";
    let plan = parse(source, DIR).unwrap();
    assert_eq!(
        plan.roots[0].kind,
        PlanNodeKind::Campaign {
            path: "/repository/sub/main.campaign".to_string()
        }
    );
    assert_eq!(plan.roots[0].children.len(), 1);
}

#[test]
fn empty_source_is_an_empty_plan() {
    let plan = parse("", DIR).unwrap();
    assert!(plan.roots.is_empty());
}

#[test]
fn malformed_line_reports_its_number() {
    let source = "ats /a.ats\n???\n";
    assert!(matches!(
        parse(source, DIR),
        Err(CampaignParseError::InvalidLine { line: 2 })
    ));
}
