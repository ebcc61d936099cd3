quantity!(Cost, "$");
