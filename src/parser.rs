// ABOUTME: Recursive-descent parser — token stream to AST, building the line-indexed Program

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer;
use crate::token::{KeywordCase, Token, TokenKind, TokenValue};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn cur_kind(&self) -> TokenKind {
        self.cur().kind
    }

    fn cur_pos(&self) -> Pos {
        Pos::new(self.cur().line, self.cur().column)
    }

    fn advance(&mut self) -> Token {
        let t = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.cur_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.err(format!("{kind}")))
        }
    }

    fn err(&self, expected: impl Into<String>) -> ParseError {
        let found = match self.cur().kind {
            TokenKind::Identifier | TokenKind::String => self.cur().text().to_string(),
            other => format!("{other}"),
        };
        ParseError::new(self.cur().line, self.cur().column, expected, found)
    }

    fn skip_statement_separators(&mut self) {
        while matches!(self.cur_kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::new();
        self.skip_statement_separators();
        while !self.check(TokenKind::Eof) {
            let line = self.parse_line(&mut program)?;
            program.lines.insert(line.number, line);
            self.skip_statement_separators();
        }
        Ok(program)
    }

    /// Parses one program line; a REPL immediate-mode line is parsed the
    /// same way by the caller after stripping the leading line number.
    fn parse_line(&mut self, program: &mut Program) -> Result<Line, ParseError> {
        let num_tok = self.eat(TokenKind::LineNumber)?;
        let number = match num_tok.value {
            TokenValue::Integer(n) => n as u32,
            _ => unreachable!(),
        };
        let statements = self.parse_statement_list(program)?;
        if !self.check(TokenKind::Eof) {
            self.eat(TokenKind::Newline)?;
        }
        Ok(Line { number, statements })
    }

    fn parse_statement_list(&mut self, program: &mut Program) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            if matches!(self.cur_kind(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_statement(program)?);
            if self.check(TokenKind::Colon) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self, program: &mut Program) -> Result<Stmt, ParseError> {
        use TokenKind::*;
        let pos = self.cur_pos();
        match self.cur_kind() {
            Question => {
                self.advance();
                self.parse_print(pos)
            }
            Print => {
                self.advance();
                self.parse_print(pos)
            }
            Let => {
                self.advance();
                self.parse_let(pos)
            }
            Identifier => self.parse_let(pos),
            Input => {
                self.advance();
                self.parse_input(pos, false)
            }
            Line => {
                self.advance();
                self.eat(Input)?;
                self.parse_input(pos, true)
            }
            If => {
                self.advance();
                self.parse_if(pos, program)
            }
            For => {
                self.advance();
                self.parse_for(pos)
            }
            Next => {
                self.advance();
                self.parse_next(pos)
            }
            While => {
                self.advance();
                let cond = self.parse_expr()?;
                Ok(Stmt::While { cond, pos })
            }
            Wend => {
                self.advance();
                Ok(Stmt::Wend { pos })
            }
            Goto => {
                self.advance();
                let target = self.parse_line_ref()?;
                Ok(Stmt::Goto { target, pos })
            }
            Gosub => {
                self.advance();
                let target = self.parse_line_ref()?;
                Ok(Stmt::Gosub { target, pos })
            }
            Return => {
                self.advance();
                Ok(Stmt::ReturnStmt { pos })
            }
            On => {
                self.advance();
                self.parse_on(pos)
            }
            Dim => {
                self.advance();
                self.parse_dim(pos)
            }
            Erase => {
                self.advance();
                let names = self.parse_name_list()?;
                Ok(Stmt::Erase { names, pos })
            }
            Option => {
                self.advance();
                self.eat(Base)?;
                let base = self.parse_uint()? as u8;
                Ok(Stmt::OptionBase { base, pos })
            }
            Data => {
                self.advance();
                self.parse_data(pos)
            }
            Read => {
                self.advance();
                let targets = self.parse_assign_target_list()?;
                Ok(Stmt::Read { targets, pos })
            }
            Restore => {
                self.advance();
                let target = if matches!(self.cur_kind(), Number) {
                    Some(self.parse_line_ref()?)
                } else {
                    None
                };
                Ok(Stmt::Restore { target, pos })
            }
            Def => {
                self.advance();
                self.parse_def_fn(pos)
            }
            Defint => {
                self.advance();
                self.parse_def_type(pos, TypeTag::Integer)
            }
            Defsng => {
                self.advance();
                self.parse_def_type(pos, TypeTag::Single)
            }
            Defdbl => {
                self.advance();
                self.parse_def_type(pos, TypeTag::Double)
            }
            Defstr => {
                self.advance();
                self.parse_def_type(pos, TypeTag::Str)
            }
            Open => {
                self.advance();
                self.parse_open(pos)
            }
            Close => {
                self.advance();
                let file_nums = self.parse_file_num_list()?;
                Ok(Stmt::Close { file_nums, pos })
            }
            Field => {
                self.advance();
                self.parse_field(pos)
            }
            Get => {
                self.advance();
                self.parse_get_put(pos, true)
            }
            Put => {
                self.advance();
                self.parse_get_put(pos, false)
            }
            Lset => {
                self.advance();
                self.parse_lset_rset(pos, true)
            }
            Rset => {
                self.advance();
                self.parse_lset_rset(pos, false)
            }
            Rem | Remark => {
                self.advance();
                Ok(Stmt::Rem { pos })
            }
            End => {
                self.advance();
                Ok(Stmt::End { pos })
            }
            Stop => {
                self.advance();
                Ok(Stmt::Stop { pos })
            }
            Clear => {
                self.advance();
                let string_space = if !matches!(self.cur_kind(), Colon | Newline | Eof) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Stmt::Clear { string_space, pos })
            }
            Chain => {
                self.advance();
                self.parse_chain(pos)
            }
            Run => {
                self.advance();
                let line = if matches!(self.cur_kind(), Number) {
                    Some(self.parse_uint()?)
                } else {
                    None
                };
                Ok(Stmt::Run { line, pos })
            }
            New => {
                self.advance();
                Ok(Stmt::New { pos })
            }
            List | Llist => {
                let to_printer = self.cur_kind() == Llist;
                self.advance();
                Ok(Stmt::List {
                    range: None,
                    to_printer,
                    pos,
                })
            }
            Load => {
                self.advance();
                let args = vec![self.parse_expr()?];
                Ok(Stmt::FileOp {
                    op: FileOpKind::Load,
                    args,
                    pos,
                })
            }
            Save => {
                self.advance();
                let args = vec![self.parse_expr()?];
                Ok(Stmt::FileOp {
                    op: FileOpKind::Save,
                    args,
                    pos,
                })
            }
            Merge => {
                self.advance();
                let args = vec![self.parse_expr()?];
                Ok(Stmt::FileOp {
                    op: FileOpKind::Merge,
                    args,
                    pos,
                })
            }
            Kill => {
                self.advance();
                let args = vec![self.parse_expr()?];
                Ok(Stmt::FileOp {
                    op: FileOpKind::Kill,
                    args,
                    pos,
                })
            }
            Name => {
                self.advance();
                let from = self.parse_expr()?;
                self.eat(As)?;
                let to = self.parse_expr()?;
                Ok(Stmt::FileOp {
                    op: FileOpKind::Name,
                    args: vec![from, to],
                    pos,
                })
            }
            Files => {
                self.advance();
                let args = if !matches!(self.cur_kind(), Colon | Newline | Eof) {
                    vec![self.parse_expr()?]
                } else {
                    vec![]
                };
                Ok(Stmt::FileOp {
                    op: FileOpKind::Files,
                    args,
                    pos,
                })
            }
            Randomize => {
                self.advance();
                let args = if !matches!(self.cur_kind(), Colon | Newline | Eof) {
                    vec![self.parse_expr()?]
                } else {
                    vec![]
                };
                Ok(Stmt::PokeOutWaitCall {
                    op: SystemOpKind::Call,
                    args,
                    pos,
                })
            }
            Swap => {
                self.advance();
                let a = self.parse_name()?;
                self.eat(Comma)?;
                let b = self.parse_name()?;
                Ok(Stmt::Swap { a, b, pos })
            }
            Poke => {
                self.advance();
                self.parse_sys_op(pos, SystemOpKind::Poke)
            }
            Out => {
                self.advance();
                self.parse_sys_op(pos, SystemOpKind::Out)
            }
            Wait => {
                self.advance();
                self.parse_sys_op(pos, SystemOpKind::Wait)
            }
            Call => {
                self.advance();
                self.parse_sys_op(pos, SystemOpKind::Call)
            }
            Tron => {
                self.advance();
                Ok(Stmt::TronTroff { on: true, pos })
            }
            Troff => {
                self.advance();
                Ok(Stmt::TronTroff { on: false, pos })
            }
            Width => {
                self.advance();
                let cols = self.parse_expr()?;
                Ok(Stmt::Width { cols, pos })
            }
            Null => {
                self.advance();
                let count = self.parse_expr()?;
                Ok(Stmt::Null { count, pos })
            }
            Common => {
                self.advance();
                let names = self.parse_name_list()?;
                Ok(Stmt::Common { names, pos })
            }
            Cont => {
                self.advance();
                Ok(Stmt::ContStmt { pos })
            }
            Error => {
                self.advance();
                let code = self.parse_expr()?;
                Ok(Stmt::ErrorStmt { code, pos })
            }
            other => Err(ParseError::new(
                pos.line,
                pos.column,
                "statement",
                format!("{other}"),
            )),
        }
    }

    // ---- statement sub-parsers -------------------------------------------------

    fn parse_print(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        let file = if self.check(TokenKind::Hash) {
            self.advance();
            let f = self.parse_expr()?;
            self.eat(TokenKind::Comma)?;
            Some(f)
        } else {
            None
        };

        let mut using = None;
        if self.check(TokenKind::Using) {
            self.advance();
            using = Some(self.parse_expr()?);
            self.eat(TokenKind::Semicolon)?;
        }

        let mut items = Vec::new();
        loop {
            if matches!(self.cur_kind(), TokenKind::Colon | TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            let expr = self.parse_expr()?;
            let trailing = match self.cur_kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    Some(PrintSep::Semicolon)
                }
                TokenKind::Comma => {
                    self.advance();
                    Some(PrintSep::Comma)
                }
                _ => None,
            };
            let has_more = trailing.is_some()
                && !matches!(self.cur_kind(), TokenKind::Colon | TokenKind::Newline | TokenKind::Eof);
            items.push(PrintItem {
                expr,
                trailing: trailing.clone(),
            });
            if !has_more {
                break;
            }
        }
        Ok(Stmt::Print {
            items,
            using,
            file,
            pos,
        })
    }

    fn parse_let(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        let target = self.parse_assign_target()?;
        self.eat(TokenKind::Equal)?;
        let value = self.parse_expr()?;
        Ok(Stmt::Let { target, value, pos })
    }

    fn parse_assign_target(&mut self) -> Result<AssignTarget, ParseError> {
        let name = self.parse_name()?;
        if self.check(TokenKind::LParen) {
            self.advance();
            let indices = self.parse_expr_list(TokenKind::RParen)?;
            self.eat(TokenKind::RParen)?;
            Ok(AssignTarget::ArrayElem(name, indices))
        } else {
            Ok(AssignTarget::Scalar(name))
        }
    }

    fn parse_assign_target_list(&mut self) -> Result<Vec<AssignTarget>, ParseError> {
        let mut targets = vec![self.parse_assign_target()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            targets.push(self.parse_assign_target()?);
        }
        Ok(targets)
    }

    fn parse_input(&mut self, pos: Pos, line_input: bool) -> Result<Stmt, ParseError> {
        let file = if self.check(TokenKind::Hash) {
            self.advance();
            let f = self.parse_expr()?;
            self.eat(TokenKind::Comma)?;
            Some(f)
        } else {
            None
        };
        let prompt = if file.is_none() && self.check(TokenKind::String) {
            let text = self.advance().text().to_string();
            match self.cur_kind() {
                TokenKind::Semicolon | TokenKind::Comma => {
                    self.advance();
                }
                _ => return Err(self.err("; or ,")),
            }
            Some(text)
        } else {
            None
        };
        let targets = self.parse_assign_target_list()?;
        Ok(Stmt::Input {
            prompt,
            file,
            line_input,
            targets,
            pos,
        })
    }

    fn parse_if(&mut self, pos: Pos, program: &mut Program) -> Result<Stmt, ParseError> {
        let cond = self.parse_expr()?;
        self.eat(TokenKind::Then)?;
        let (then_branch, then_goto) = self.parse_then_else_body(program)?;
        let mut else_branch = Vec::new();
        let mut else_goto = None;
        if self.check(TokenKind::Else) {
            self.advance();
            let (b, g) = self.parse_then_else_body(program)?;
            else_branch = b;
            else_goto = g;
        }
        Ok(Stmt::If {
            cond,
            then_branch,
            then_goto,
            else_branch,
            else_goto,
            pos,
        })
    }

    fn parse_then_else_body(
        &mut self,
        program: &mut Program,
    ) -> Result<(Vec<Stmt>, Option<u32>), ParseError> {
        if self.check(TokenKind::Number) {
            let target = self.parse_uint()?;
            return Ok((Vec::new(), Some(target)));
        }
        let mut stmts = vec![self.parse_statement(program)?];
        while self.check(TokenKind::Colon) {
            self.advance();
            if matches!(self.cur_kind(), TokenKind::Else | TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_statement(program)?);
        }
        Ok((stmts, None))
    }

    fn parse_for(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        let var = self.parse_name()?;
        self.eat(TokenKind::Equal)?;
        let start = self.parse_expr()?;
        self.eat(TokenKind::To)?;
        let end = self.parse_expr()?;
        let step = if self.check(TokenKind::Step) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Stmt::ForStmt {
            var,
            start,
            end,
            step,
            pos,
        })
    }

    fn parse_next(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        let mut vars = Vec::new();
        if self.check(TokenKind::Identifier) {
            vars.push(self.parse_name()?);
            while self.check(TokenKind::Comma) {
                self.advance();
                vars.push(self.parse_name()?);
            }
        }
        Ok(Stmt::Next { vars, pos })
    }

    fn parse_on(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        if self.check(TokenKind::Error) {
            self.advance();
            self.eat(TokenKind::Goto)?;
            let target = self.parse_uint()?;
            return Ok(Stmt::OnErrorGoto { target, pos });
        }
        let selector = self.parse_expr()?;
        let kind = match self.cur_kind() {
            TokenKind::Goto => OnTarget::Goto,
            TokenKind::Gosub => OnTarget::Gosub,
            _ => return Err(self.err("GOTO or GOSUB")),
        };
        self.advance();
        let mut targets = vec![self.parse_uint()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            targets.push(self.parse_uint()?);
        }
        Ok(Stmt::OnGotoGosub {
            selector,
            kind,
            targets,
            pos,
        })
    }

    fn parse_dim(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        let mut arrays = Vec::new();
        loop {
            let name = self.parse_name()?;
            self.eat(TokenKind::LParen)?;
            let dims = self.parse_expr_list(TokenKind::RParen)?;
            self.eat(TokenKind::RParen)?;
            arrays.push((name, dims));
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(Stmt::Dim { arrays, pos })
    }

    fn parse_data(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        let mut values = Vec::new();
        loop {
            if matches!(self.cur_kind(), TokenKind::Colon | TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            match self.cur_kind() {
                TokenKind::String => {
                    let s = self.advance().text().to_string();
                    values.push(DataItem::Str(s));
                }
                TokenKind::Number => {
                    let tok = self.advance();
                    let lit = match tok.value {
                        TokenValue::Integer(n) => NumberLit::Integer(n),
                        TokenValue::Real(f) => NumberLit::Double(f),
                        _ => unreachable!(),
                    };
                    values.push(DataItem::Number(lit));
                }
                TokenKind::Identifier => {
                    // bareword DATA items (unquoted strings) are common in MBASIC
                    let s = self.advance().text().to_string();
                    values.push(DataItem::Str(s));
                }
                _ => return Err(self.err("DATA item")),
            }
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(Stmt::Data { values, pos })
    }

    fn parse_def_fn(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.eat(TokenKind::Fn)?;
        let name_tok = self.eat(TokenKind::Identifier)?;
        let name = name_tok.text().to_string();
        let mut params = Vec::new();
        if self.check(TokenKind::LParen) {
            self.advance();
            if !self.check(TokenKind::RParen) {
                params.push(self.parse_name()?);
                while self.check(TokenKind::Comma) {
                    self.advance();
                    params.push(self.parse_name()?);
                }
            }
            self.eat(TokenKind::RParen)?;
        }
        self.eat(TokenKind::Equal)?;
        let body = self.parse_expr()?;
        Ok(Stmt::DefFn {
            name,
            params,
            body,
            pos,
        })
    }

    fn parse_def_type(&mut self, pos: Pos, letter_type: TypeTag) -> Result<Stmt, ParseError> {
        let mut ranges = Vec::new();
        loop {
            let from_tok = self.eat(TokenKind::Identifier)?;
            let from = from_tok.text().chars().next().unwrap_or('A');
            let to = if self.check(TokenKind::Minus) {
                self.advance();
                let to_tok = self.eat(TokenKind::Identifier)?;
                to_tok.text().chars().next().unwrap_or(from)
            } else {
                from
            };
            ranges.push((from, to));
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(Stmt::DefType {
            letter_type,
            ranges,
            pos,
        })
    }

    fn parse_open(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        let path = self.parse_expr()?;
        self.eat(TokenKind::For)?;
        let mode = match self.cur_kind() {
            TokenKind::Input => OpenMode::Input,
            TokenKind::Random => OpenMode::Random,
            TokenKind::Identifier if self.cur().text().eq_ignore_ascii_case("OUTPUT") => {
                OpenMode::Output
            }
            TokenKind::Identifier if self.cur().text().eq_ignore_ascii_case("APPEND") => {
                OpenMode::Append
            }
            _ => return Err(self.err("INPUT, OUTPUT, APPEND, or RANDOM")),
        };
        self.advance();
        self.eat(TokenKind::As)?;
        if self.check(TokenKind::Hash) {
            self.advance();
        }
        let file_num = self.parse_expr()?;
        let record_len = if self.check(TokenKind::Identifier)
            && self.cur().text().eq_ignore_ascii_case("LEN")
        {
            self.advance();
            self.eat(TokenKind::Equal)?;
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Stmt::Open {
            path,
            mode,
            file_num,
            record_len,
            pos,
        })
    }

    fn parse_file_num_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut nums = Vec::new();
        if matches!(self.cur_kind(), TokenKind::Colon | TokenKind::Newline | TokenKind::Eof) {
            return Ok(nums);
        }
        loop {
            if self.check(TokenKind::Hash) {
                self.advance();
            }
            nums.push(self.parse_expr()?);
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(nums)
    }

    fn parse_field(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        if self.check(TokenKind::Hash) {
            self.advance();
        }
        let file_num = self.parse_expr()?;
        self.eat(TokenKind::Comma)?;
        let mut fields = Vec::new();
        loop {
            let width = self.parse_expr()?;
            self.eat(TokenKind::As)?;
            let var = self.parse_name()?;
            fields.push(FieldSpec { width, var });
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(Stmt::Field {
            file_num,
            fields,
            pos,
        })
    }

    fn parse_get_put(&mut self, pos: Pos, is_get: bool) -> Result<Stmt, ParseError> {
        if self.check(TokenKind::Hash) {
            self.advance();
        }
        let file_num = self.parse_expr()?;
        let record = if self.check(TokenKind::Comma) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(if is_get {
            Stmt::Get {
                file_num,
                record,
                pos,
            }
        } else {
            Stmt::Put {
                file_num,
                record,
                pos,
            }
        })
    }

    fn parse_lset_rset(&mut self, pos: Pos, left: bool) -> Result<Stmt, ParseError> {
        let target = self.parse_name()?;
        self.eat(TokenKind::Equal)?;
        let value = self.parse_expr()?;
        Ok(Stmt::LsetRset {
            target,
            value,
            left,
            pos,
        })
    }

    fn parse_chain(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        let merge = if self.check(TokenKind::Merge) {
            self.advance();
            true
        } else {
            false
        };
        let path = self.parse_expr()?;
        let line = if self.check(TokenKind::Comma) {
            self.advance();
            if matches!(self.cur_kind(), TokenKind::Number) {
                Some(self.parse_uint()?)
            } else {
                None
            }
        } else {
            None
        };
        let mut all = false;
        let mut delete = None;
        if self.check(TokenKind::Comma) {
            self.advance();
            if self.check(TokenKind::Identifier) && self.cur().text().eq_ignore_ascii_case("ALL") {
                self.advance();
                all = true;
            }
        }
        if self.check(TokenKind::Comma) {
            self.advance();
            if self.check(TokenKind::Delete) {
                self.advance();
                let a = self.parse_uint()?;
                self.eat(TokenKind::Minus)?;
                let b = self.parse_uint()?;
                delete = Some((a, b));
            }
        }
        Ok(Stmt::Chain {
            path,
            line,
            merge,
            all,
            delete,
            pos,
        })
    }

    fn parse_sys_op(&mut self, pos: Pos, op: SystemOpKind) -> Result<Stmt, ParseError> {
        let mut args = vec![self.parse_expr()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            args.push(self.parse_expr()?);
        }
        Ok(Stmt::PokeOutWaitCall { op, args, pos })
    }

    // ---- shared helpers ---------------------------------------------------

    fn parse_uint(&mut self) -> Result<u32, ParseError> {
        let tok = self.eat(TokenKind::Number)?;
        match tok.value {
            TokenValue::Integer(n) if n >= 0 => Ok(n as u32),
            _ => Err(ParseError::new(
                tok.line,
                tok.column,
                "non-negative integer",
                "other",
            )),
        }
    }

    fn parse_line_ref(&mut self) -> Result<u32, ParseError> {
        self.parse_uint()
    }

    fn parse_name(&mut self) -> Result<Name, ParseError> {
        let tok = self.eat(TokenKind::Identifier)?;
        let text = tok.text();
        let (base, suffix) = split_suffix(text);
        Ok(Name::new(base, suffix))
    }

    fn parse_name_list(&mut self) -> Result<Vec<Name>, ParseError> {
        let mut names = vec![self.parse_name()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            names.push(self.parse_name()?);
        }
        Ok(names)
    }

    fn parse_expr_list(&mut self, terminator: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = Vec::new();
        if self.check(terminator) {
            return Ok(exprs);
        }
        exprs.push(self.parse_expr()?);
        while self.check(TokenKind::Comma) {
            self.advance();
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    // ---- expression grammar (spec §4.D precedence, loosest to tightest) ---

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or_xor_eqv_imp()
    }

    fn parse_or_xor_eqv_imp(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        loop {
            let op = match self.cur_kind() {
                TokenKind::Or => BinOp::Or,
                TokenKind::Xor => BinOp::Xor,
                TokenKind::Eqv => BinOp::Eqv,
                TokenKind::Imp => BinOp::Imp,
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_not()?;
        while self.check(TokenKind::And) {
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenKind::Not) {
            let pos = self.cur_pos();
            self.advance();
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                expr: Box::new(expr),
                pos,
            });
        }
        self.parse_relational()
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.cur_kind() {
                TokenKind::Equal => BinOp::Eq,
                TokenKind::NotEqual => BinOp::Ne,
                TokenKind::Less => BinOp::Lt,
                TokenKind::LessEqual => BinOp::Le,
                TokenKind::Greater => BinOp::Gt,
                TokenKind::GreaterEqual => BinOp::Ge,
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.cur_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_intdiv()?;
        loop {
            let op = match self.cur_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_intdiv()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_intdiv(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mod()?;
        while self.check(TokenKind::Backslash) {
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_mod()?;
            lhs = Expr::Binary {
                op: BinOp::IntDiv,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_mod(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while self.check(TokenKind::Mod) {
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op: BinOp::Mod,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.cur_kind() {
            TokenKind::Minus => {
                let pos = self.cur_pos();
                self.advance();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnOp::Neg,
                    expr: Box::new(expr),
                    pos,
                })
            }
            TokenKind::Plus => {
                let pos = self.cur_pos();
                self.advance();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnOp::Pos,
                    expr: Box::new(expr),
                    pos,
                })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if self.check(TokenKind::Caret) {
            let pos = self.cur_pos();
            self.advance();
            let exp = self.parse_unary()?; // right-associative
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exp),
                pos,
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.cur_pos();
        match self.cur_kind() {
            TokenKind::Number => {
                let tok = self.advance();
                let value = match tok.value {
                    TokenValue::Integer(n) => NumberLit::Integer(n),
                    TokenValue::Real(f) => NumberLit::Single(f as f32),
                    _ => unreachable!(),
                };
                Ok(Expr::Number { value, pos })
            }
            TokenKind::String => {
                let tok = self.advance();
                Ok(Expr::Str {
                    value: tok.text().to_string(),
                    pos,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                self.eat(TokenKind::RParen)?;
                Ok(e)
            }
            TokenKind::Identifier => {
                let tok = self.advance();
                let text = tok.text().to_string();
                let (base, suffix) = split_suffix(&text);
                if self.check(TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_expr_list(TokenKind::RParen)?;
                    self.eat(TokenKind::RParen)?;
                    if is_known_builtin(&base.to_uppercase()) {
                        Ok(Expr::Call {
                            name: base.to_uppercase(),
                            args,
                            pos,
                        })
                    } else {
                        Ok(Expr::ArrayRef {
                            name: Name::new(base, suffix),
                            indices: args,
                            pos,
                        })
                    }
                } else {
                    Ok(Expr::Var {
                        name: Name::new(base, suffix),
                        pos,
                    })
                }
            }
            TokenKind::Fn => {
                self.advance();
                let name_tok = self.eat(TokenKind::Identifier)?;
                let name = format!("FN{}", name_tok.text().to_uppercase());
                let mut args = Vec::new();
                if self.check(TokenKind::LParen) {
                    self.advance();
                    args = self.parse_expr_list(TokenKind::RParen)?;
                    self.eat(TokenKind::RParen)?;
                }
                Ok(Expr::Call { name, args, pos })
            }
            other => Err(ParseError::new(
                pos.line,
                pos.column,
                "expression",
                format!("{other}"),
            )),
        }
    }
}

fn split_suffix(text: &str) -> (String, Option<TypeTag>) {
    if let Some(last) = text.chars().last() {
        let tag = match last {
            '%' => Some(TypeTag::Integer),
            '!' => Some(TypeTag::Single),
            '#' => Some(TypeTag::Double),
            '$' => Some(TypeTag::Str),
            _ => None,
        };
        if let Some(t) = tag {
            return (text[..text.len() - 1].to_string(), Some(t));
        }
    }
    (text.to_string(), None)
}

/// Names recognized as calls rather than array references when followed
/// by `(` (spec §4.D: "`name(args)` is a function call if `name` resolves
/// to a built-in or a `DEF FN` function, else an array reference").
///
/// `DEF FN` user functions are parsed via the `FN` keyword prefix, so this
/// table only needs the built-in catalogue (spec §4.G).
fn is_known_builtin(upper: &str) -> bool {
    matches!(
        upper,
        "ABS" | "ATN" | "COS" | "SIN" | "TAN" | "EXP" | "FIX" | "INT" | "LOG" | "RND" | "SGN"
            | "SQR" | "ASC" | "CHR$" | "HEX$" | "OCT$" | "INSTR" | "LEFT$" | "LEN" | "MID$"
            | "RIGHT$" | "SPACE$" | "SPC" | "STR$" | "STRING$" | "TAB" | "VAL" | "CDBL" | "CINT"
            | "CSNG" | "CVD" | "CVI" | "CVS" | "MKD$" | "MKI$" | "MKS$" | "EOF" | "LOC" | "LOF"
            | "LPOS" | "POS" | "INPUT$" | "INKEY$" | "FRE" | "INP" | "PEEK" | "USR" | "VARPTR"
    )
}

pub fn parse_program(
    src: &str,
    keyword_case: KeywordCase,
) -> Result<Program, crate::error::CompileError> {
    let tokens = lexer::tokenize(src, keyword_case).map_err(crate::error::CompileError::Lex)?;
    let mut parser = Parser::new(tokens);
    parser
        .parse_program()
        .map_err(crate::error::CompileError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::KeywordCase;

    fn parse(src: &str) -> Program {
        let tokens = lexer::tokenize(src, KeywordCase::Preserve).unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    #[test]
    fn hello_world_program() {
        let program = parse("10 PRINT \"HELLO\"\n20 END\n");
        assert_eq!(program.lines.len(), 2);
        assert!(matches!(program.lines[&10].statements[0], Stmt::Print { .. }));
        assert!(matches!(program.lines[&20].statements[0], Stmt::End { .. }));
    }

    #[test]
    fn for_next_loop() {
        let program = parse("10 FOR I = 1 TO 3\n20 PRINT I\n30 NEXT I\n");
        assert!(matches!(program.lines[&10].statements[0], Stmt::ForStmt { .. }));
        assert!(matches!(program.lines[&30].statements[0], Stmt::Next { .. }));
    }

    #[test]
    fn if_then_line_number_is_goto() {
        let program = parse("10 IF A = 1 THEN 100\n");
        match &program.lines[&10].statements[0] {
            Stmt::If { then_goto, .. } => assert_eq!(*then_goto, Some(100)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn precedence_and_before_or() {
        let program = parse("10 X = A OR B AND C\n");
        match &program.lines[&10].statements[0] {
            Stmt::Let { value, .. } => match value {
                Expr::Binary {
                    op: BinOp::Or, rhs, ..
                } => {
                    assert!(matches!(**rhs, Expr::Binary { op: BinOp::And, .. }));
                }
                other => panic!("unexpected top-level op {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn builtin_call_vs_array_ref() {
        let program = parse("10 X = ABS(-5)\n20 Y = A(1)\n");
        match &program.lines[&10].statements[0] {
            Stmt::Let {
                value: Expr::Call { name, .. },
                ..
            } => assert_eq!(name, "ABS"),
            _ => panic!("expected call"),
        }
        match &program.lines[&20].statements[0] {
            Stmt::Let {
                value: Expr::ArrayRef { .. },
                ..
            } => {}
            _ => panic!("expected array ref"),
        }
    }

    #[test]
    fn data_statement_collects_mixed_items() {
        let program = parse("10 DATA 1, \"hi\", 3\n");
        match &program.lines[&10].statements[0] {
            Stmt::Data { values, .. } => assert_eq!(values.len(), 3),
            _ => panic!("expected data"),
        }
    }

    #[test]
    fn def_fn_parses_single_expression_body() {
        let program = parse("10 DEF FNSQ(X) = X * X\n");
        assert!(matches!(program.lines[&10].statements[0], Stmt::DefFn { .. }));
    }

    #[test]
    fn question_mark_aliases_print() {
        let program = parse("10 ? \"HI\"\n");
        assert!(matches!(program.lines[&10].statements[0], Stmt::Print { .. }));
    }

    #[test]
    fn colon_separated_statements_on_one_line() {
        let program = parse("10 A = 1 : B = 2\n");
        assert_eq!(program.lines[&10].statements.len(), 2);
    }
}
