use serde_json::json;
use sqlgen::{Error, Params, SqlGenerator};

fn engine() -> SqlGenerator {
    let config = json!({
        "sqls": {
            "count_user": "SELECT COUNT(*) FROM users",
            "get_user_by_id": "SELECT * FROM users WHERE id = ${user_id}",
            "get_user_paginated": "SELECT * FROM users LIMIT ${limit} OFFSET ${offset}",
            "insert_user": {
                "main": {
                    "sql": "INSERT INTO users (username, password) VALUES ('${username}', '${password}')",
                    "params": { "password": "123456" }
                }
            },
            "get_height_more_than_avg": {
                "main": "SELECT * FROM users WHERE height > (@avg_height())",
                "avg_height": "SELECT AVG(height) FROM users"
            },
            "sub_sql_param": {
                "main": "SELECT * FROM t WHERE a = @quote(p=${param})",
                "quote": "'${p}'"
            },
            "nested_call": {
                "main": "@outer(x=@inner())",
                "inner": "42",
                "outer": "[${x}]"
            },
            "shorthand": {
                "main": "@where_id(id)",
                "where_id": "WHERE id = ${id}"
            },
            "scoped": {
                "main": "@child()",
                "child": "<${secret}>"
            },
            "suffixed": {
                "main": "@wrap(v=${x})",
                "wrap": {
                    "sql": "${v}${suffix}",
                    "params": { "suffix": "!" }
                }
            },
            "object_param":
                "INSERT INTO address (province, city) VALUES ('${address.province}', '${address.city}')",
            "array_param":
                "INSERT INTO address (province, city) VALUES ('${address[0]}', '${address[1]}')",
            "keyed_param": "${address['province']}",
            "user_rows": {
                "main": "INSERT INTO users (name, city) VALUES @for(u in users, separator=\", \")('${u.name}', '${u.address.city}')@endfor"
            },
            "branch": "@if(x == 1)A@elif(x == 2)B@else C@endif",
            "gate": "@if(x)Y@endif",
            "name_list": "[@for(u in users, separator=\", \")${u.name}@endfor]",
            "indexed": "@for((u, i) in users, separator=\", \")${i}:${u}@endfor",
            "pairs": "@for((v, k) in obj, separator=\"&\")${k}=${v}@endfor",
            "scalar_loop": "@for(x in n)X@endfor",
            "paged": {
                "main": { "sql": "LIMIT ${limit}", "params": { "limit": 10 } }
            },
            "menu": {
                "main": "@node(name=${root.name}, children=${root.children})",
                "node": "${name}@if(children)[@for(c in children, separator=\",\")@node(name=${c.name}, children=${c.children})@endfor]@endif"
            },
            "unicode": "SELECT * FROM 用户 WHERE 省份 = '${地址.省份}'",
            "raw_json": "${obj}",
            "broken": "${",
            "unclosed": "@if(x == 'abc)y@endif",
            "stray_close": "@endif"
        }
    });
    SqlGenerator::new(&config).expect("valid configuration")
}

#[test]
fn plain_statement_renders_verbatim() {
    let sql = engine().render("count_user", Params::new()).unwrap();
    assert_eq!(sql, "SELECT COUNT(*) FROM users");
}

#[test]
fn integer_parameter_interpolation() {
    let mut params = Params::new();
    params.set("user_id", 1);
    let sql = engine().render("get_user_by_id", params).unwrap();
    assert_eq!(sql, "SELECT * FROM users WHERE id = 1");
}

#[test]
fn multiple_parameters() {
    let mut params = Params::new();
    params.set("limit", 10).set("offset", 300);
    let sql = engine().render("get_user_paginated", params).unwrap();
    assert_eq!(sql, "SELECT * FROM users LIMIT 10 OFFSET 300");
}

#[test]
fn missing_parameter_renders_empty() {
    let sql = engine().render("get_user_by_id", Params::new()).unwrap();
    assert_eq!(sql, "SELECT * FROM users WHERE id = ");
}

#[test]
fn default_parameter_fills_in() {
    let mut params = Params::new();
    params.set("username", "zhangsan");
    let sql = engine().render("insert_user", params).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO users (username, password) VALUES ('zhangsan', '123456')"
    );
}

#[test]
fn caller_parameter_overrides_default() {
    let mut params = Params::new();
    params.set("username", "zhangsan").set("password", "secret");
    let sql = engine().render("insert_user", params).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO users (username, password) VALUES ('zhangsan', 'secret')"
    );
}

#[test]
fn integer_default_keeps_its_type() {
    let sql = engine().render("paged", Params::new()).unwrap();
    assert_eq!(sql, "LIMIT 10");
}

#[test]
fn sub_sql_without_arguments() {
    let sql = engine()
        .render("get_height_more_than_avg", Params::new())
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE height > (SELECT AVG(height) FROM users)"
    );
}

#[test]
fn sub_sql_argument_evaluated_in_caller_scope() {
    let mut params = Params::new();
    params.set("param", "hello");
    let sql = engine().render("sub_sql_param", params).unwrap();
    assert_eq!(sql, "SELECT * FROM t WHERE a = 'hello'");
}

#[test]
fn sub_sql_as_argument_value() {
    let sql = engine().render("nested_call", Params::new()).unwrap();
    assert_eq!(sql, "[42]");
}

#[test]
fn bare_argument_forwards_caller_parameter() {
    let mut params = Params::new();
    params.set("id", 7);
    let sql = engine().render("shorthand", params).unwrap();
    assert_eq!(sql, "WHERE id = 7");
}

#[test]
fn sub_template_applies_its_own_defaults() {
    let eng = engine();

    let mut params = Params::new();
    params.set("x", "hi");
    assert_eq!(eng.render("suffixed", params).unwrap(), "hi!");

    let mut params = Params::new();
    params.set("x", "hi");
    params.set("suffix", "?");
    // Caller parameters do not leak into the sub-template; only the
    // explicit bindings and the sub-template's defaults apply.
    assert_eq!(eng.render("suffixed", params).unwrap(), "hi!");
}

#[test]
fn sub_template_does_not_see_caller_parameters() {
    let mut params = Params::new();
    params.set("secret", "s");
    let sql = engine().render("scoped", params).unwrap();
    assert_eq!(sql, "<>");
}

#[test]
fn object_member_access() {
    let mut params = Params::new();
    params.set("address", json!({ "province": "hlj", "city": "sfh" }));
    let sql = engine().render("object_param", params).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO address (province, city) VALUES ('hlj', 'sfh')"
    );
}

#[test]
fn missing_member_renders_empty() {
    let mut params = Params::new();
    params.set("address", json!({ "province": "hlj" }));
    let sql = engine().render("object_param", params).unwrap();
    assert_eq!(sql, "INSERT INTO address (province, city) VALUES ('hlj', '')");
}

#[test]
fn array_index_access() {
    let mut params = Params::new();
    params.set("address", json!(["hlj", "sfh"]));
    let sql = engine().render("array_param", params).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO address (province, city) VALUES ('hlj', 'sfh')"
    );
}

#[test]
fn string_index_reads_object_member() {
    let mut params = Params::new();
    params.set("address", json!({ "province": "hlj" }));
    let sql = engine().render("keyed_param", params).unwrap();
    assert_eq!(sql, "hlj");
}

#[test]
fn loop_over_array_of_objects() {
    let mut params = Params::new();
    params.set(
        "users",
        json!([
            { "name": "zhangsan", "address": { "province": "hlj", "city": "sfh" } },
            { "name": "lisi", "address": { "province": "hlj", "city": "mdj" } }
        ]),
    );
    let sql = engine().render("user_rows", params).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO users (name, city) VALUES ('zhangsan', 'sfh'), ('lisi', 'mdj')"
    );
}

#[test]
fn if_elif_else_branches() {
    let eng = engine();

    let mut params = Params::new();
    params.set("x", 1);
    assert_eq!(eng.render("branch", params).unwrap(), "A");

    let mut params = Params::new();
    params.set("x", 2);
    assert_eq!(eng.render("branch", params).unwrap(), "B");

    let mut params = Params::new();
    params.set("x", 3);
    assert_eq!(eng.render("branch", params).unwrap(), " C");

    // null compares unequal to 1 and 2
    assert_eq!(eng.render("branch", Params::new()).unwrap(), " C");
}

#[test]
fn condition_truthiness() {
    let eng = engine();

    assert_eq!(eng.render("gate", Params::new()).unwrap(), "");

    let mut params = Params::new();
    params.set("x", 0);
    assert_eq!(eng.render("gate", params).unwrap(), "");

    let mut params = Params::new();
    params.set("x", "");
    assert_eq!(eng.render("gate", params).unwrap(), "");

    let mut params = Params::new();
    params.set("x", 1);
    assert_eq!(eng.render("gate", params).unwrap(), "Y");

    let mut params = Params::new();
    params.set("x", "a");
    assert_eq!(eng.render("gate", params).unwrap(), "Y");

    let mut params = Params::new();
    params.set("x", json!([0]));
    assert_eq!(eng.render("gate", params).unwrap(), "Y");
}

#[test]
fn loop_with_separator() {
    let mut params = Params::new();
    params.set(
        "users",
        json!([{ "name": "a" }, { "name": "b" }, { "name": "c" }]),
    );
    let sql = engine().render("name_list", params).unwrap();
    assert_eq!(sql, "[a, b, c]");
}

#[test]
fn loop_binds_value_and_index() {
    let mut params = Params::new();
    params.set("users", json!(["a", "b"]));
    let sql = engine().render("indexed", params).unwrap();
    assert_eq!(sql, "0:a, 1:b");
}

#[test]
fn loop_over_object_binds_member_names() {
    let mut params = Params::new();
    params.set("obj", json!({ "a": 1, "b": 2 }));
    let sql = engine().render("pairs", params).unwrap();
    assert_eq!(sql, "a=1&b=2");
}

#[test]
fn loop_over_scalar_renders_nothing() {
    let mut params = Params::new();
    params.set("n", 5);
    assert_eq!(engine().render("scalar_loop", params).unwrap(), "");
}

#[test]
fn loop_over_empty_array_renders_nothing() {
    let mut params = Params::new();
    params.set("users", json!([]));
    assert_eq!(engine().render("name_list", params).unwrap(), "[]");
}

#[test]
fn recursive_sub_sql_renders_tree() {
    let mut params = Params::new();
    params.set(
        "root",
        json!({
            "name": "top",
            "children": [
                { "name": "a", "children": [ { "name": "x" } ] },
                { "name": "b" }
            ]
        }),
    );
    let sql = engine().render("menu", params).unwrap();
    assert_eq!(sql, "top[a[x],b]");
}

#[test]
fn utf8_identifiers_and_text() {
    let mut params = Params::new();
    params.set("地址", json!({ "省份": "黑龙江" }));
    let sql = engine().render("unicode", params).unwrap();
    assert_eq!(sql, "SELECT * FROM 用户 WHERE 省份 = '黑龙江'");
}

#[test]
fn structured_json_is_not_interpolated() {
    let mut params = Params::new();
    params.set("obj", json!({ "k": 1 }));
    assert_eq!(engine().render("raw_json", params).unwrap(), "");
}

#[test]
fn render_section_addresses_auxiliary_sections() {
    let sql = engine()
        .render_section("get_height_more_than_avg", "avg_height", Params::new())
        .unwrap();
    assert_eq!(sql, "SELECT AVG(height) FROM users");
}

#[test]
fn repeated_renders_reuse_the_compiled_template() {
    let eng = engine();
    for (x, expected) in [(1, "A"), (2, "B"), (1, "A"), (3, " C")] {
        let mut params = Params::new();
        params.set("x", x);
        assert_eq!(eng.render("branch", params).unwrap(), expected);
    }

    // Same inputs against a fresh engine give the same outputs.
    let fresh = engine();
    let mut params = Params::new();
    params.set("x", 2);
    assert_eq!(fresh.render("branch", params).unwrap(), "B");
}

#[test]
fn unknown_template_is_an_error() {
    let err = engine().render("no_such_template", Params::new()).unwrap_err();
    assert!(matches!(err, Error::UnknownTemplate(name) if name == "no_such_template"));
}

#[test]
fn unknown_section_is_an_error() {
    let err = engine()
        .render_section("get_height_more_than_avg", "missing", Params::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownSection { .. }));
}

#[test]
fn configuration_requires_a_sqls_object() {
    assert!(matches!(
        SqlGenerator::new(&json!({})),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        SqlGenerator::new(&json!({ "sqls": 3 })),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn malformed_template_fails_on_first_render() {
    let eng = engine();
    assert!(eng.render("broken", Params::new()).is_err());
    assert!(matches!(
        eng.render("unclosed", Params::new()),
        Err(Error::UnclosedString { .. })
    ));
    assert!(matches!(
        eng.render("stray_close", Params::new()),
        Err(Error::TrailingInput)
    ));
}

#[test]
fn dump_tokens_lists_the_token_stream() {
    let dump = engine().dump_tokens("get_user_by_id", "main").unwrap();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(
        lines,
        [
            "Tokens for get_user_by_id:",
            "[NormalText]<SELECT * FROM users WHERE id = >",
            "[Dollar]",
            "[LBrace]",
            "[Identifier]<user_id>",
            "[RBrace]",
        ]
    );
}

#[test]
fn dump_ast_shows_the_compiled_tree() {
    let dump = engine().dump_ast("branch", "main").unwrap();
    assert_eq!(
        dump,
        "If (x == 1)\n  Text \"A\"\nElIf (x == 2)\n  Text \"B\"\nElse\n  Text \" C\"\n"
    );
}
