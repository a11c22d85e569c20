//! SQL DDL parser
//!
//! Reads `CREATE TABLE` statements (column types with parameters, inline and
//! table-level keys, defaults, references) and `ALTER TABLE ... ADD FOREIGN
//! KEY`. Other statements are skipped. Each table is one entity.

pub mod dialect;
pub mod lexer;

pub use dialect::SqlDialect;

use self::lexer::{Token, TokenKind, tokenize};
use super::{decode_text, file_stem, has_extension, sniff};
use crate::detection::{
    DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin, SampleRecord,
};
use once_cell::sync::Lazy;
use regex::Regex;
use schemalens_core::{
    FieldConstraints, FieldInfo, ForeignKeyRef, FormatType, NormalizedType, SchemaDetails,
};
use serde_json::Value;

#[allow(clippy::expect_used)]
static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bcreate\s+(or\s+replace\s+)?((global|local)\s+)?(temp|temporary|unlogged)?\s*table\b")
        .expect("valid create table regex")
});

const COLUMN_CONSTRAINTS: &[&str] = &[
    "NOT", "NULL", "PRIMARY", "UNIQUE", "DEFAULT", "REFERENCES", "CHECK", "CONSTRAINT",
    "AUTO_INCREMENT", "AUTOINCREMENT", "IDENTITY", "COLLATE", "GENERATED", "COMMENT", "ON",
    "CHARSET",
];

const TABLE_CONSTRAINTS: &[&str] = &[
    "PRIMARY", "UNIQUE", "FOREIGN", "CONSTRAINT", "CHECK", "KEY", "INDEX", "FULLTEXT", "SPATIAL",
    "EXCLUDE",
];

#[derive(Debug, Default)]
struct ColumnDef {
    name: String,
    raw_type: String,
    type_params: Vec<String>,
    not_null: bool,
    primary: bool,
    unique: bool,
    auto_increment: bool,
    default: Option<String>,
    references: Option<ForeignKeyRef>,
}

#[derive(Debug, Default)]
struct TableDef {
    name: String,
    qualified: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    unique: Vec<Vec<String>>,
    foreign_keys: Vec<(Vec<String>, ForeignKeyRef)>,
}

/// Token cursor over one statement
struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
    end_offset: usize,
}

impl<'t> Cursor<'t> {
    fn new(tokens: &'t [Token], end_offset: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end_offset,
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn at_symbol(&self, symbol: char) -> bool {
        self.peek().is_some_and(|t| t.is_symbol(symbol))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let matches = keywords
            .iter()
            .enumerate()
            .all(|(i, k)| self.peek_at(i).is_some_and(|t| t.is_keyword(k)));
        if matches {
            self.pos += keywords.len();
        }
        matches
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end_offset, |t| t.offset)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax_at(message, Some(self.offset()), None)
    }

    fn expect_symbol(&mut self, symbol: char, context: &str) -> ParseResult<()> {
        if self.at_symbol(symbol) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{symbol}' {context}")))
        }
    }

    fn ident(&mut self, context: &str) -> ParseResult<String> {
        match self.peek().and_then(Token::ident) {
            Some(ident) => {
                self.pos += 1;
                Ok(ident.to_string())
            }
            None => Err(self.error(format!("expected identifier {context}"))),
        }
    }

    /// `schema.table` or `table`; returns (last segment, qualified)
    fn qualified_name(&mut self, context: &str) -> ParseResult<(String, String)> {
        let mut parts = vec![self.ident(context)?];
        while self.at_symbol('.') {
            self.pos += 1;
            parts.push(self.ident(context)?);
        }
        let last = parts.last().cloned().unwrap_or_default();
        Ok((last, parts.join(".")))
    }

    /// Tokens of a balanced parenthesized group, without the outer parens
    fn group(&mut self) -> ParseResult<&'t [Token]> {
        let open = self.offset();
        self.expect_symbol('(', "to open a group")?;
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(token) = self.advance() {
            if token.is_symbol('(') {
                depth += 1;
            } else if token.is_symbol(')') {
                depth -= 1;
                if depth == 0 {
                    return Ok(&self.tokens[start..self.pos - 1]);
                }
            }
        }
        Err(ParseError::syntax_at("unbalanced parenthesis", Some(open), None))
    }

    /// Identifier list `(a, b)`
    fn ident_list(&mut self) -> ParseResult<Vec<String>> {
        Ok(self
            .group()?
            .iter()
            .filter_map(Token::ident)
            .filter(|name| !name.eq_ignore_ascii_case("ASC") && !name.eq_ignore_ascii_case("DESC"))
            .map(str::to_string)
            .collect())
    }

    /// Skip to the `,` or `)` ending the current definition
    fn skip_definition(&mut self) -> ParseResult<()> {
        while let Some(token) = self.peek() {
            if token.is_symbol(',') || token.is_symbol(')') {
                return Ok(());
            }
            if token.is_symbol('(') {
                self.group()?;
            } else {
                self.pos += 1;
            }
        }
        Ok(())
    }
}

fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        if token.is_symbol(',') {
            out.push_str(", ");
        } else {
            out.push_str(&token.text());
        }
    }
    out
}

/// `REFERENCES table [(col)]` with trailing actions skipped
fn parse_references(cursor: &mut Cursor<'_>) -> ParseResult<ForeignKeyRef> {
    let (entity, _) = cursor.qualified_name("after REFERENCES")?;
    let field = if cursor.at_symbol('(') {
        cursor.ident_list()?.into_iter().next()
    } else {
        None
    };
    loop {
        if cursor.eat_keyword("ON") {
            cursor.advance();
            if cursor.eat_keywords(&["SET", "NULL"])
                || cursor.eat_keywords(&["SET", "DEFAULT"])
                || cursor.eat_keywords(&["NO", "ACTION"])
            {
                continue;
            }
            cursor.advance();
        } else if cursor.eat_keyword("MATCH") {
            cursor.advance();
        } else if cursor.eat_keyword("DEFERRABLE") {
            cursor.eat_keywords(&["INITIALLY", "DEFERRED"]);
            cursor.eat_keywords(&["INITIALLY", "IMMEDIATE"]);
        } else {
            break;
        }
    }
    Ok(ForeignKeyRef { entity, field })
}

fn parse_column(cursor: &mut Cursor<'_>) -> ParseResult<ColumnDef> {
    let mut column = ColumnDef {
        name: cursor.ident("for column name")?,
        ..ColumnDef::default()
    };

    // type words and parameter groups
    let mut type_text = String::new();
    while let Some(token) = cursor.peek() {
        if token.is_symbol(',') || token.is_symbol(')') {
            break;
        }
        if token.is_symbol('(') {
            let params = cursor.group()?;
            column.type_params = params
                .iter()
                .filter(|t| !t.is_symbol(','))
                .map(|t| match &t.kind {
                    TokenKind::Str(s) => s.clone(),
                    _ => t.text(),
                })
                .collect();
            type_text.push('(');
            type_text.push_str(&render(params));
            type_text.push(')');
            continue;
        }
        if token.is_symbol('[') && cursor.peek_at(1).is_some_and(|t| t.is_symbol(']')) {
            type_text.push_str("[]");
            cursor.pos += 2;
            continue;
        }
        let is_constraint = COLUMN_CONSTRAINTS.iter().any(|k| token.is_keyword(k))
            || (token.is_keyword("CHARACTER")
                && !type_text.is_empty()
                && cursor.peek_at(1).is_some_and(|t| t.is_keyword("SET")));
        if is_constraint || token.ident().is_none() {
            break;
        }
        if !type_text.is_empty() {
            type_text.push(' ');
        }
        type_text.push_str(&token.text());
        cursor.pos += 1;
    }
    column.raw_type = type_text;

    // column constraints
    while let Some(token) = cursor.peek() {
        if token.is_symbol(',') || token.is_symbol(')') {
            break;
        }
        if cursor.eat_keywords(&["NOT", "NULL"]) {
            column.not_null = true;
        } else if cursor.eat_keywords(&["PRIMARY", "KEY"]) {
            column.primary = true;
            if cursor.eat_keyword("AUTOINCREMENT") {
                column.auto_increment = true;
            }
        } else if cursor.eat_keyword("UNIQUE") {
            column.unique = true;
            cursor.eat_keyword("KEY");
        } else if cursor.eat_keyword("DEFAULT") {
            column.default = Some(parse_default(cursor)?);
        } else if cursor.eat_keyword("REFERENCES") {
            column.references = Some(parse_references(cursor)?);
        } else if cursor.eat_keyword("CHECK") {
            cursor.group()?;
        } else if cursor.eat_keyword("AUTO_INCREMENT") || cursor.eat_keyword("AUTOINCREMENT") {
            column.auto_increment = true;
        } else if cursor.eat_keyword("IDENTITY") {
            column.auto_increment = true;
            if cursor.at_symbol('(') {
                cursor.group()?;
            }
        } else if cursor.eat_keyword("GENERATED") {
            while !cursor.at_symbol(',') && !cursor.at_symbol(')') && cursor.peek().is_some() {
                if cursor.at_keyword("IDENTITY") {
                    column.auto_increment = true;
                }
                if cursor.at_symbol('(') {
                    cursor.group()?;
                } else {
                    cursor.pos += 1;
                }
            }
        } else if token.is_symbol('(') {
            cursor.group()?;
        } else {
            // NULL, CONSTRAINT name, COLLATE x, COMMENT 'x', ...
            cursor.pos += 1;
        }
    }
    Ok(column)
}

fn parse_default(cursor: &mut Cursor<'_>) -> ParseResult<String> {
    if cursor.at_symbol('(') {
        return Ok(render(cursor.group()?));
    }
    let mut text = String::new();
    if cursor.at_symbol('-') {
        text.push('-');
        cursor.pos += 1;
    }
    if let Some(token) = cursor.advance() {
        text.push_str(&match &token.kind {
            TokenKind::Str(s) => s.clone(),
            _ => token.text(),
        });
    }
    if cursor.at_symbol('(') {
        text.push('(');
        text.push_str(&render(cursor.group()?));
        text.push(')');
    }
    // PostgreSQL casts: 'x'::text
    while cursor.at_symbol(':') && cursor.peek_at(1).is_some_and(|t| t.is_symbol(':')) {
        cursor.pos += 2;
        cursor.advance();
    }
    Ok(text)
}

fn parse_table_constraint(cursor: &mut Cursor<'_>, table: &mut TableDef) -> ParseResult<()> {
    if cursor.eat_keyword("CONSTRAINT") {
        cursor.advance();
    }
    if cursor.eat_keywords(&["PRIMARY", "KEY"]) {
        table.primary_key = cursor.ident_list()?;
    } else if cursor.eat_keyword("UNIQUE") {
        if !cursor.eat_keyword("KEY") {
            cursor.eat_keyword("INDEX");
        }
        if !cursor.at_symbol('(') {
            cursor.advance();
        }
        table.unique.push(cursor.ident_list()?);
    } else if cursor.eat_keywords(&["FOREIGN", "KEY"]) {
        if !cursor.at_symbol('(') {
            cursor.advance();
        }
        let columns = cursor.ident_list()?;
        if !cursor.eat_keyword("REFERENCES") {
            return Err(cursor.error("expected REFERENCES after FOREIGN KEY"));
        }
        let target = parse_references(cursor)?;
        table.foreign_keys.push((columns, target));
    }
    cursor.skip_definition()
}

fn parse_create_table(cursor: &mut Cursor<'_>, ctx: &ParseContext) -> ParseResult<Option<TableDef>> {
    cursor.eat_keyword("CREATE");
    cursor.eat_keywords(&["OR", "REPLACE"]);
    for modifier in ["GLOBAL", "LOCAL", "TEMP", "TEMPORARY", "UNLOGGED"] {
        cursor.eat_keyword(modifier);
    }
    if !cursor.eat_keyword("TABLE") {
        return Ok(None);
    }
    cursor.eat_keywords(&["IF", "NOT", "EXISTS"]);
    let (name, qualified) = cursor.qualified_name("for table name")?;
    if !cursor.at_symbol('(') {
        // CREATE TABLE ... AS SELECT
        return Ok(None);
    }
    let open = cursor.offset();
    cursor.pos += 1;

    let mut table = TableDef {
        name,
        qualified,
        ..TableDef::default()
    };
    loop {
        ctx.check()?;
        let Some(token) = cursor.peek() else {
            return Err(ParseError::syntax_at(
                format!("unterminated column list for table {}", table.name),
                Some(open),
                None,
            ));
        };
        if token.is_symbol(')') {
            cursor.pos += 1;
            break;
        }
        if token.is_symbol(',') {
            cursor.pos += 1;
            continue;
        }
        // MySQL `KEY idx (col)` versus a column literally named `key`
        let is_table_constraint = if token.is_keyword("KEY") || token.is_keyword("INDEX") {
            cursor.peek_at(1).is_some_and(|t| t.is_symbol('('))
                || (cursor.peek_at(2).is_some_and(|t| t.is_symbol('('))
                    && !cursor.peek_at(1).is_some_and(|t| t.is_keyword("VARCHAR") || t.is_keyword("CHAR")))
        } else {
            TABLE_CONSTRAINTS.iter().any(|k| token.is_keyword(k))
        };
        if is_table_constraint {
            parse_table_constraint(cursor, &mut table)?;
        } else {
            let column = parse_column(cursor)?;
            table.columns.push(column);
        }
    }
    Ok(Some(table))
}

/// `ALTER TABLE t ADD [CONSTRAINT n] FOREIGN KEY (c) REFERENCES p (k)`
fn parse_alter_table(cursor: &mut Cursor<'_>, tables: &mut [TableDef]) -> ParseResult<()> {
    cursor.eat_keyword("ALTER");
    if !cursor.eat_keyword("TABLE") {
        return Ok(());
    }
    cursor.eat_keyword("ONLY");
    cursor.eat_keywords(&["IF", "EXISTS"]);
    let (name, _) = cursor.qualified_name("for table name")?;
    if !cursor.eat_keyword("ADD") {
        return Ok(());
    }
    let Some(table) = tables.iter_mut().find(|t| t.name.eq_ignore_ascii_case(&name)) else {
        return Ok(());
    };
    if cursor.at_keyword("CONSTRAINT") || cursor.at_keyword("FOREIGN") || cursor.at_keyword("PRIMARY") || cursor.at_keyword("UNIQUE") {
        parse_table_constraint(cursor, table)?;
    } else {
        cursor.eat_keyword("COLUMN");
        let column = parse_column(cursor)?;
        table.columns.push(column);
    }
    Ok(())
}

/// Split tokens into statements at top-level `;` and SQL Server `GO`
fn statements(tokens: &[Token]) -> Vec<&[Token]> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate() {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && (token.is_symbol(';') || (token.is_keyword("GO") && idx == start)) {
            if idx > start {
                out.push(&tokens[start..idx]);
            }
            start = idx + 1;
        }
    }
    if start < tokens.len() {
        out.push(&tokens[start..]);
    }
    out
}

fn build_fields(table: &TableDef) -> Vec<FieldInfo> {
    let composite = table.primary_key.len() > 1;
    table
        .columns
        .iter()
        .map(|column| {
            let in_table_pk = table
                .primary_key
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&column.name));
            let in_unique = table
                .unique
                .iter()
                .any(|cols| cols.len() == 1 && cols[0].eq_ignore_ascii_case(&column.name));
            let references = column.references.clone().or_else(|| {
                table
                    .foreign_keys
                    .iter()
                    .find(|(cols, _)| cols.iter().any(|c| c.eq_ignore_ascii_case(&column.name)))
                    .map(|(_, target)| target.clone())
            });

            let base = column
                .raw_type
                .split(['(', ' '])
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase();
            let mut constraints = FieldConstraints {
                unique: column.unique || in_unique,
                default_value: column.default.clone(),
                references,
                ..FieldConstraints::default()
            };
            if matches!(
                base.as_str(),
                "VARCHAR" | "CHAR" | "CHARACTER" | "NVARCHAR" | "NCHAR" | "VARCHAR2"
            ) {
                constraints.max_length = column.type_params.first().and_then(|p| p.parse().ok());
            }
            if base == "ENUM" || base == "SET" {
                constraints.enum_values.clone_from(&column.type_params);
            }

            let required = column.not_null || column.primary || in_table_pk;
            let mut field = FieldInfo::new(&column.name, &column.raw_type)
                .nullable(!required)
                .required(required)
                .with_constraints(constraints)
                .with_entity(&table.name);
            if base == "ENUM" {
                field = field.with_normalized_type(NormalizedType::String);
            }
            if column.primary || in_table_pk {
                field = field.primary_key();
                if composite {
                    field.constraints.unique = false;
                    field.metadata.insert("composite_key".to_string(), true.into());
                }
            }
            if column.auto_increment {
                field.metadata.insert("auto_increment".to_string(), true.into());
            }
            if table.qualified != table.name {
                field
                    .metadata
                    .insert("qualified_table".to_string(), table.qualified.clone().into());
            }
            field
        })
        .collect()
}

fn parse_tables(text: &str, ctx: &ParseContext) -> ParseResult<Vec<TableDef>> {
    let tokens = tokenize(text).map_err(|e| e.located_in(text.as_bytes()))?;
    let mut tables: Vec<TableDef> = Vec::new();
    for statement in statements(&tokens) {
        ctx.check()?;
        let mut cursor = Cursor::new(statement, text.len());
        let result = if cursor.at_keyword("CREATE") {
            parse_create_table(&mut cursor, ctx).map(|table| {
                if let Some(table) = table {
                    tables.retain(|t| !t.name.eq_ignore_ascii_case(&table.name));
                    tables.push(table);
                }
            })
        } else if cursor.at_keyword("ALTER") {
            parse_alter_table(&mut cursor, &mut tables)
        } else {
            Ok(())
        };
        result.map_err(|e| e.located_in(text.as_bytes()))?;
    }
    Ok(tables)
}

fn placeholder(field: &FieldInfo, row: usize) -> Value {
    let choices = &field.constraints.enum_values;
    if let Some(value) = choices.get(row % choices.len().max(1)) {
        return Value::String(value.clone());
    }
    let n = row + 1;
    match field.normalized_type {
        NormalizedType::Integer => n.into(),
        NormalizedType::Float => (n as f64 * 1.5).into(),
        NormalizedType::Boolean => (row % 2 == 0).into(),
        NormalizedType::Date => format!("2024-01-{:02}", n % 28 + 1).into(),
        NormalizedType::Datetime => format!("2024-01-{:02}T12:00:00Z", n % 28 + 1).into(),
        NormalizedType::Unknown | NormalizedType::Array | NormalizedType::Object | NormalizedType::Map => Value::Null,
        NormalizedType::String => format!("{}_{n}", field.name).into(),
    }
}

/// SQL DDL parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlParser;

impl SqlParser {
    /// Create a new SQL parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ParserPlugin for SqlParser {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Sql
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        let head = sniff(content, 64 * 1024);
        let has_create = CREATE_TABLE.is_match(head);
        match (has_create, has_extension(filename, &["sql", "ddl"])) {
            (true, true) => (true, 0.95).into(),
            (true, false) => (true, 0.7).into(),
            (false, true) => (true, 0.5).into(),
            (false, false) => DetectionResult::NO,
        }
    }

    fn parse_schema(
        &self,
        filename: &str,
        content: &[u8],
        ctx: &ParseContext,
    ) -> ParseResult<SchemaDetails> {
        let text = decode_text(content)?;
        let tables = parse_tables(text, ctx)?;

        let mut schema = SchemaDetails::new(FormatType::Sql, file_stem(filename), filename);
        schema.set_metadata("dialect", SqlDialect::detect(text).as_str());
        schema.set_metadata(
            "tables",
            tables.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
        );
        schema.set_metadata("table_count", tables.len());
        for table in &tables {
            schema.fields.extend(build_fields(table));
        }
        tracing::debug!(path = filename, tables = tables.len(), "parsed SQL DDL");
        Ok(schema)
    }

    /// Synthesized placeholder rows, one set per table
    fn extract_sample_data(&self, content: &[u8], max_records: usize) -> ParseResult<Vec<SampleRecord>> {
        let schema = self.parse_schema("", content, &ParseContext::default())?;
        let rows = max_records.min(5);
        Ok((0..rows)
            .map(|row| {
                schema
                    .fields
                    .iter()
                    .map(|field| (field.sample_key(), placeholder(field, row)))
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ParseErrorKind;
    use pretty_assertions::assert_eq;

    const SHOP: &str = r"
-- shop schema
CREATE TABLE users (
    id SERIAL PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    created_at TIMESTAMP WITH TIME ZONE DEFAULT now()
);

CREATE TABLE IF NOT EXISTS public.orders (
    id BIGINT NOT NULL,
    user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
    total NUMERIC(10, 2) DEFAULT 0,
    status VARCHAR(20) CHECK (status IN ('new', 'paid')),
    PRIMARY KEY (id)
);

CREATE TABLE order_items (
    order_id BIGINT NOT NULL,
    sku TEXT,
    CONSTRAINT fk_order FOREIGN KEY (order_id) REFERENCES orders (id)
);
";

    fn parse(text: &str) -> SchemaDetails {
        SqlParser::new()
            .parse_schema("db/shop.sql", text.as_bytes(), &ParseContext::default())
            .unwrap()
    }

    #[test]
    fn test_tables_become_entities() {
        let schema = parse(SHOP);
        assert_eq!(schema.entity_names(), vec!["users", "orders", "order_items"]);
        assert_eq!(schema.metadata.get("dialect"), Some(&"postgresql".into()));

        let email = schema.fields.iter().find(|f| f.name == "email").unwrap();
        assert_eq!(email.field_type, "VARCHAR(255)");
        assert_eq!(email.constraints.max_length, Some(255));
        assert!(email.constraints.unique);
        assert!(!email.nullable);

        let total = schema.fields.iter().find(|f| f.name == "total").unwrap();
        assert_eq!(total.field_type, "NUMERIC(10, 2)");
        assert_eq!(total.normalized_type, NormalizedType::Float);
        assert_eq!(total.constraints.default_value.as_deref(), Some("0"));
    }

    #[test]
    fn test_keys_and_references() {
        let schema = parse(SHOP);
        let order_id = schema
            .fields
            .iter()
            .find(|f| f.entity.as_deref() == Some("orders") && f.name == "id")
            .unwrap();
        assert!(order_id.is_primary_key);
        assert_eq!(order_id.metadata.get("qualified_table"), Some(&"public.orders".into()));

        let user_id = schema.fields.iter().find(|f| f.name == "user_id").unwrap();
        assert!(user_id.is_foreign_key_hint);
        assert_eq!(
            user_id.constraints.references,
            Some(ForeignKeyRef { entity: "users".into(), field: Some("id".into()) })
        );

        let item_order = schema.fields.iter().find(|f| f.name == "order_id").unwrap();
        assert_eq!(item_order.constraints.references.as_ref().unwrap().entity, "orders");
    }

    #[test]
    fn test_alter_table_adds_foreign_key() {
        let schema = parse(
            "CREATE TABLE a (id INT PRIMARY KEY);\nCREATE TABLE b (a_id INT);\nALTER TABLE b ADD CONSTRAINT fk FOREIGN KEY (a_id) REFERENCES a(id);",
        );
        let a_id = schema.fields.iter().find(|f| f.name == "a_id").unwrap();
        assert!(a_id.is_foreign_key_hint);
    }

    #[test]
    fn test_mysql_enum_and_dialect() {
        let schema = parse("CREATE TABLE `t` (`id` INT UNSIGNED AUTO_INCREMENT PRIMARY KEY, `kind` ENUM('a','b') NOT NULL, `ok` TINYINT(1)) ENGINE=InnoDB;");
        assert_eq!(schema.metadata.get("dialect"), Some(&"mysql".into()));
        let kind = schema.fields.iter().find(|f| f.name == "kind").unwrap();
        assert_eq!(kind.constraints.enum_values, vec!["a".to_string(), "b".to_string()]);
        let ok = schema.fields.iter().find(|f| f.name == "ok").unwrap();
        assert_eq!(ok.normalized_type, NormalizedType::Boolean);
        let id = schema.fields.iter().find(|f| f.name == "id").unwrap();
        assert_eq!(id.metadata.get("auto_increment"), Some(&true.into()));
    }

    #[test]
    fn test_unterminated_table_is_syntax_error() {
        let err = SqlParser::new()
            .parse_schema("bad.sql", b"CREATE TABLE t (\n  id INT,\n  name TEXT", &ParseContext::default())
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert_eq!(err.offset, Some(15));
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_placeholder_samples_per_table() {
        let samples = SqlParser::new()
            .extract_sample_data(SHOP.as_bytes(), 3)
            .unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].get("users#id"), Some(&Value::from(1)));
        assert!(samples[0].contains_key("orders#user_id"));
    }
}
